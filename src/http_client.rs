use std::future::Future;

use async_trait::async_trait;
use http::{Request, Response};

#[derive(thiserror::Error, Debug)]
pub enum HttpClientError {
    /// Represents an http transport crate error.
    #[error("HTTP Transport error: `{0}`")]
    TransportError(String),
    /// Represents an encode error.
    #[error("error encoding `{0}`")]
    EncoderError(String),
    /// Represents an unexpected response.
    #[error("invalid http response: `{0}`")]
    InvalidResponse(String),
}

/// An asynchronous trait that defines the internal methods for HTTP clients.
///
/// Non-2xx responses are not errors at this level: they are returned as regular responses so
/// the caller can classify them.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request. The method and url are defined inside the Request.
    async fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
}

// Accept async closures as HttpClient implementations
#[async_trait]
impl<F, Fut> HttpClient for F
where
    F: Fn(Request<Vec<u8>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Vec<u8>>, HttpClientError>> + Send + 'static,
{
    async fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        self(req).await
    }
}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;

    use mockall::mock;

    mock! {
        pub HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
        }
    }

    /// Builds a JSON response with the provided status, for use in mock expectations.
    pub(crate) fn json_response(status: u16, body: serde_json::Value) -> Response<Vec<u8>> {
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn closures_are_http_clients() {
        let client = |req: Request<Vec<u8>>| async move {
            Ok::<_, HttpClientError>(json_response(
                200,
                serde_json::json!({ "path": req.uri().path() }),
            ))
        };

        let request = Request::builder()
            .uri("http://localhost/api/vehicles/")
            .body(Vec::new())
            .unwrap();
        let response = client.send(request).await.unwrap();

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["path"], "/api/vehicles/");
    }
}
