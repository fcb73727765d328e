use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::ApiClient;
use crate::ApiError;
use crate::credential::{Credential, CredentialStore, StoreError, UserProfile};
use crate::http_client::HttpClient;
use crate::request::{ApiResponse, RequestDescriptor};
use crate::session::{AccessDecision, SessionSink};
use crate::token::{AccessToken, RefreshToken};

/// Body returned by the login and impersonation endpoints: the tokens next to the profile.
#[derive(Deserialize)]
struct SessionGrant {
    access: AccessToken,
    #[serde(default)]
    refresh: Option<RefreshToken>,
    #[serde(flatten)]
    user: Map<String, Value>,
}

impl<C, S, K> ApiClient<C, S, K>
where
    C: HttpClient + 'static,
    S: CredentialStore + 'static,
    K: SessionSink + 'static,
{
    /// Signs in and installs the returned session.
    ///
    /// Rejected credentials surface as the original 401, without refresh or navigation.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        let request = RequestDescriptor::post(self.inner.login_path.as_str())
            .with_json(&json!({ "username": username, "password": password }))?;
        let response = self.send(request).await?;

        let user = self.install_session(&response)?;
        info!(username, "signed in");
        Ok(user)
    }

    /// Signs in as a user of another organization. `user_id` picks a specific member.
    pub async fn impersonate(
        &self,
        organization_id: u64,
        user_id: Option<u64>,
    ) -> Result<UserProfile, ApiError> {
        let body = match user_id {
            Some(user_id) => json!({ "user_id": user_id }),
            None => json!({}),
        };
        let response = self
            .post(
                &format!("admin/organizations/{organization_id}/impersonate/"),
                &body,
            )
            .await?;

        let user = self.install_session(&response)?;
        info!(organization_id, "impersonating organization user");
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.inner.store.clear()?;
        self.inner.sink.clear_disabled_reason();
        debug!("signed out");
        Ok(())
    }

    /// Shallow-merges `updates` into the cached profile and returns the result.
    pub fn update_user(&self, updates: Map<String, Value>) -> Result<UserProfile, StoreError> {
        let mut user = self.inner.store.user()?.unwrap_or_default();
        user.merge(updates);
        self.inner.store.set_user(&user)?;
        Ok(user)
    }

    pub fn access_decision(&self) -> Result<AccessDecision, StoreError> {
        self.inner
            .terminator
            .access_decision(&self.inner.store, &self.inner.sink)
    }

    fn install_session(&self, response: &ApiResponse) -> Result<UserProfile, ApiError> {
        let grant: SessionGrant = response.json()?;
        let user = UserProfile::from(grant.user);

        let store = &self.inner.store;
        store.set(&Credential::new(grant.access, grant.refresh))?;
        store.set_user(&user)?;
        self.inner.sink.clear_disabled_reason();

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::client::tests::{FakeApi, RefreshReply, client_with, signed_in};
    use crate::credential::{MemoryCredentialStore, StoredSession};

    #[tokio::test]
    async fn login_installs_the_session() {
        let api = FakeApi::new("tok1", RefreshReply::Access("tok2"));
        let client = client_with(&api, MemoryCredentialStore::default());
        client.sink().store_disabled_reason("Account Suspended. Contact Support.");

        let user = client.login("admin", "secret").await.unwrap();

        assert_eq!(user.username(), Some("admin"));
        assert_eq!(user.get("role"), Some(&json!("dispatcher")));
        assert_eq!(user.get("access"), None);
        assert_eq!(
            client.store().get().unwrap(),
            Some(Credential::new("tok1".into(), Some("r1".into())))
        );
        assert_eq!(client.store().user().unwrap(), Some(user));
        assert_eq!(client.sink().disabled_reason(), None);
        assert_eq!(client.access_decision().unwrap(), AccessDecision::Allowed);

        let login = &api.calls_to("token/")[0];
        assert_eq!(login.method, Method::POST);
        assert_eq!(login.body, json!({ "username": "admin", "password": "secret" }));
    }

    #[tokio::test]
    async fn failed_login_keeps_the_previous_session() {
        let api = FakeApi::new("tok1", RefreshReply::Access("tok2"));
        let client = client_with(&api, MemoryCredentialStore::default());

        let err = client.login("admin", "hunter2").await.unwrap_err();

        assert_matches!(err, ApiError::Status { status, .. } if status == StatusCode::UNAUTHORIZED);
        assert_eq!(client.store().load().unwrap(), StoredSession::default());
        assert!(api.calls_to("token/refresh/").is_empty());
        assert!(client.sink().navigations().is_empty());
    }

    #[tokio::test]
    async fn impersonation_replaces_the_session() {
        let api = FakeApi::new("tok1", RefreshReply::Access("tok2"));
        let client = client_with(&api, signed_in());

        let user = client.impersonate(12, Some(40)).await.unwrap();

        assert_eq!(user.username(), Some("impersonated-40"));
        // No refresh token in the grant, the previous one must not survive.
        assert_eq!(
            client.store().get().unwrap(),
            Some(Credential::new("imp1".into(), None))
        );
        let call = &api.calls_to("admin/organizations/12/impersonate/")[0];
        assert_eq!(call.authorization.as_deref(), Some("Bearer tok1"));
        assert_eq!(call.body, json!({ "user_id": 40 }));

        client.impersonate(12, None).await.unwrap();
        assert_eq!(
            api.calls_to("admin/organizations/12/impersonate/")[1].body,
            json!({})
        );
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let api = FakeApi::new("tok1", RefreshReply::Access("tok2"));
        let client = client_with(&api, signed_in());
        client.sink().store_disabled_reason("Subscription Expired. Contact Support.");

        client.logout().unwrap();

        assert_eq!(client.store().load().unwrap(), StoredSession::default());
        assert_eq!(client.sink().disabled_reason(), None);
        assert_eq!(client.access_decision().unwrap(), AccessDecision::LoginRequired);
        assert!(api.calls().is_empty());
    }

    #[test]
    fn update_user_merges_into_the_cached_profile() {
        let api = FakeApi::new("tok1", RefreshReply::Access("tok2"));
        let client = client_with(&api, signed_in());

        let user = client
            .update_user(Map::from_iter([
                ("first_name".to_string(), json!("Ada")),
                ("organization_status".to_string(), json!("suspended")),
            ]))
            .unwrap();

        assert_eq!(user.username(), Some("ops"));
        assert_eq!(user.get("first_name"), Some(&json!("Ada")));
        assert_eq!(client.store().user().unwrap(), Some(user));
        assert_eq!(
            client.access_decision().unwrap(),
            AccessDecision::Disabled("Account suspended.".into())
        );
    }
}
