use async_trait::async_trait;
use http::{Request, Response};
use reqwest::{Client, Proxy, Response as ReqwestResponse};
use tracing::debug;

use crate::http::config::HttpConfig;
use crate::http_client::{HttpClient as ApiHttpClient, HttpClientError};

/// [`ApiHttpClient`] backed by an async reqwest client with rustls.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, HttpBuildError> {
        let builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(config.timeout)
            .connect_timeout(config.conn_timeout);

        let builder = match config.proxy.url().as_uri() {
            Some(proxy_url) => {
                debug!(%proxy_url, "routing api requests through proxy");
                let proxy = Proxy::all(proxy_url.to_string())
                    .map_err(|err| HttpBuildError::InvalidProxy(err.to_string()))?;
                builder.proxy(proxy)
            }
            // The proxy configuration already looked at the environment.
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self { client })
    }

    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpResponseError> {
        let (parts, body) = request.into_parts();
        let req = self
            .client
            .request(parts.method, parts.uri.to_string().as_str())
            .headers(parts.headers)
            .body(body);

        let res = req
            .send()
            .await
            .map_err(|err| HttpResponseError::TransportError(err.to_string()))?;

        try_build_response(res).await
    }
}

async fn try_build_response(res: ReqwestResponse) -> Result<Response<Vec<u8>>, HttpResponseError> {
    let mut response_builder = http::Response::builder()
        .status(res.status())
        .version(res.version());

    for (name, value) in res.headers() {
        response_builder = response_builder.header(name, value);
    }

    let body: Vec<u8> = res
        .bytes()
        .await
        .map_err(|err| HttpResponseError::ReadingResponse(err.to_string()))?
        .into();

    response_builder
        .body(body)
        .map_err(|err| HttpResponseError::BuildingResponse(err.to_string()))
}

#[async_trait]
impl ApiHttpClient for HttpClient {
    async fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        let response = HttpClient::send(self, req).await?;

        Ok(response)
    }
}

impl From<HttpResponseError> for HttpClientError {
    fn from(err: HttpResponseError) -> Self {
        match err {
            HttpResponseError::TransportError(msg) => HttpClientError::TransportError(msg),
            HttpResponseError::BuildingResponse(msg) | HttpResponseError::ReadingResponse(msg) => {
                HttpClientError::InvalidResponse(msg)
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
    #[error("invalid proxy: {0}")]
    InvalidProxy(String),
}

#[derive(thiserror::Error, Debug)]
enum HttpResponseError {
    #[error("could not read response body: {0}")]
    ReadingResponse(String),
    #[error("could not build response: {0}")]
    BuildingResponse(String),
    #[error("http transport error: `{0}`")]
    TransportError(String),
}
