use http::Method;
use serde_json::Value;

use crate::ApiClient;
use crate::commands::CommandError;
use crate::credential::CredentialStore;
use crate::http_client::HttpClient;
use crate::request::RequestDescriptor;
use crate::session::SessionSink;

pub struct RequestCommand<C, S, K> {
    client: ApiClient<C, S, K>,
}

impl<C, S, K> RequestCommand<C, S, K>
where
    C: HttpClient + 'static,
    S: CredentialStore + 'static,
    K: SessionSink + 'static,
{
    pub fn new(client: ApiClient<C, S, K>) -> Self {
        Self { client }
    }

    /// Sends one request through the client. An empty response body comes back as `null`.
    pub async fn request(
        self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Value, CommandError> {
        let mut request = RequestDescriptor::new(method, path);
        if let Some(body) = body {
            let body: Value =
                serde_json::from_str(body).map_err(|e| CommandError::InvalidBody(e.to_string()))?;
            request = request.with_json(&body)?;
        }

        let response = self.client.send(request).await?;
        if response.body().is_empty() {
            return Ok(Value::Null);
        }
        Ok(response.json()?)
    }
}
