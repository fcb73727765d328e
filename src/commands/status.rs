use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::ApiClient;
use crate::commands::CommandError;
use crate::credential::CredentialStore;
use crate::http_client::HttpClient;
use crate::session::{AccessDecision, SessionSink};
use crate::token::AccessClaims;

/// Local view of the stored session. Nothing is sent to the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub access: AccessDecision,
    pub username: Option<String>,
    pub token: Option<AccessClaims>,
    pub token_expired: bool,
    pub can_refresh: bool,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.access {
            AccessDecision::Allowed => writeln!(f, "access: allowed")?,
            AccessDecision::LoginRequired => writeln!(f, "access: login required")?,
            AccessDecision::Disabled(reason) => writeln!(f, "access: disabled ({reason})")?,
        }
        if let Some(username) = &self.username {
            writeln!(f, "username: {username}")?;
        }
        if let Some(token) = &self.token {
            let state = if self.token_expired { "expired" } else { "valid" };
            writeln!(f, "access token: {state}, {token}")?;
        }
        write!(f, "refresh token: {}", if self.can_refresh { "stored" } else { "none" })
    }
}

pub struct StatusCommand<C, S, K> {
    client: ApiClient<C, S, K>,
}

impl<C, S, K> StatusCommand<C, S, K>
where
    C: HttpClient + 'static,
    S: CredentialStore + 'static,
    K: SessionSink + 'static,
{
    pub fn new(client: ApiClient<C, S, K>) -> Self {
        Self { client }
    }

    pub fn status(self) -> Result<SessionStatus, CommandError> {
        let access = self.client.access_decision()?;
        let session = self.client.store().load()?;

        let token = session
            .token
            .as_deref()
            .and_then(|token| match AccessClaims::decode(token) {
                Ok(claims) => Some(claims),
                Err(err) => {
                    debug!("stored access token is not a readable JWT: {err}");
                    None
                }
            });

        Ok(SessionStatus {
            access,
            username: session
                .user
                .as_ref()
                .and_then(|user| user.username())
                .map(str::to_owned),
            token_expired: token.as_ref().is_some_and(AccessClaims::is_expired),
            token,
            can_refresh: session.refresh_token.is_some(),
        })
    }
}
