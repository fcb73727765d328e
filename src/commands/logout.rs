use tracing::info;

use crate::ApiClient;
use crate::commands::CommandError;
use crate::credential::CredentialStore;
use crate::http_client::HttpClient;
use crate::session::SessionSink;

pub struct LogoutCommand<C, S, K> {
    client: ApiClient<C, S, K>,
}

impl<C, S, K> LogoutCommand<C, S, K>
where
    C: HttpClient + 'static,
    S: CredentialStore + 'static,
    K: SessionSink + 'static,
{
    pub fn new(client: ApiClient<C, S, K>) -> Self {
        Self { client }
    }

    pub fn logout(self) -> Result<(), CommandError> {
        self.client.logout()?;
        info!("stored session removed");
        Ok(())
    }
}
