use http::header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::ApiError;

/// One outbound API call.
///
/// `path` is relative to the client's base url. `retried` is flipped by the client the single
/// time it replays the request after a credential refresh.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    id: Uuid,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
    retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = serde_json::to_vec(body).map_err(|e| ApiError::Encode(e.to_string()))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Sets `Authorization: Bearer <token>`, flagged as sensitive so it never shows up in logs.
    pub fn set_bearer(&mut self, access_token: &str) -> Result<(), InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {access_token}"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub(crate) fn to_http_request(&self, base_url: &Url) -> Result<http::Request<Vec<u8>>, ApiError> {
        let url = join_url(base_url, &self.path)?;
        let uri = Uri::try_from(url.as_str()).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        let mut builder = http::Request::builder().method(self.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
        }

        builder
            .body(self.body.clone())
            .map_err(|e| ApiError::Encode(format!("building request: {e}")))
    }
}

/// Joins a request path onto the base url the way the browser client did: the base always acts
/// as a directory and leading slashes of the path are ignored.
pub(crate) fn join_url(base_url: &Url, path: &str) -> Result<Url, ApiError> {
    let mut base = base_url.to_owned();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
}

/// Response of a successful call, or the failing response carried by [`ApiError::Status`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::Decode(format!(
                "{e}. Response body: {}",
                String::from_utf8_lossy(&self.body)
            ))
        })
    }

    /// The `detail` string of a JSON error body, if any.
    pub fn detail(&self) -> Option<String> {
        serde_json::from_slice::<Value>(&self.body)
            .ok()?
            .get("detail")?
            .as_str()
            .map(str::to_owned)
    }
}

impl From<Response<Vec<u8>>> for ApiResponse {
    fn from(response: Response<Vec<u8>>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("http://localhost:8000/api/", "vehicles/", "http://localhost:8000/api/vehicles/")]
    #[case("http://localhost:8000/api", "vehicles/", "http://localhost:8000/api/vehicles/")]
    #[case("http://localhost:8000/api/", "/trips/4/", "http://localhost:8000/api/trips/4/")]
    #[case(
        "https://tms.example.com/api/",
        "token/refresh/",
        "https://tms.example.com/api/token/refresh/"
    )]
    #[case(
        "http://localhost:8000/api/",
        "logs/?page=2",
        "http://localhost:8000/api/logs/?page=2"
    )]
    fn joins_paths_onto_the_base(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        let base = Url::parse(base).unwrap();
        assert_eq!(join_url(&base, path).unwrap().as_str(), expected);
    }

    #[test]
    fn builds_json_http_request() {
        let base = Url::parse("http://localhost:8000/api/").unwrap();
        let mut request = RequestDescriptor::patch("customers/12/")
            .with_json(&json!({ "name": "Acme Freight" }))
            .unwrap();
        request.set_bearer("tok1").unwrap();

        let http_request = request.to_http_request(&base).unwrap();

        assert_eq!(http_request.method(), Method::PATCH);
        assert_eq!(
            http_request.uri(),
            "http://localhost:8000/api/customers/12/"
        );
        assert_eq!(
            http_request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            http_request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer tok1"
        );
        assert!(http_request.headers().get(AUTHORIZATION).unwrap().is_sensitive());
        let body: Value = serde_json::from_slice(http_request.body()).unwrap();
        assert_eq!(body, json!({ "name": "Acme Freight" }));
    }

    #[test]
    fn new_requests_are_not_retried() {
        let mut request = RequestDescriptor::get("vehicles/");
        assert!(!request.is_retried());
        request.mark_retried();
        assert!(request.is_retried());
    }

    #[test]
    fn invalid_bearer_is_rejected() {
        let mut request = RequestDescriptor::get("vehicles/");
        assert!(request.set_bearer("tok\n1").is_err());
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn response_detail_and_json() {
        let response = ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            serde_json::to_vec(&json!({ "detail": "Account Suspended. Contact Support." }))
                .unwrap(),
        );

        assert_eq!(
            response.detail().as_deref(),
            Some("Account Suspended. Contact Support.")
        );
        assert_matches!(response.json::<Vec<u32>>(), Err(ApiError::Decode(_)));
        assert_eq!(ApiResponse::new(StatusCode::OK, b"[]".to_vec()).detail(), None);
    }
}
