use crate::ApiClient;
use crate::commands::CommandError;
use crate::credential::{CredentialStore, UserProfile};
use crate::http_client::HttpClient;
use crate::session::SessionSink;

pub struct LoginCommand<C, S, K> {
    client: ApiClient<C, S, K>,
}

impl<C, S, K> LoginCommand<C, S, K>
where
    C: HttpClient + 'static,
    S: CredentialStore + 'static,
    K: SessionSink + 'static,
{
    pub fn new(client: ApiClient<C, S, K>) -> Self {
        Self { client }
    }

    pub async fn login(self, username: &str, password: &str) -> Result<UserProfile, CommandError> {
        Ok(self.client.login(username, password).await?)
    }
}
