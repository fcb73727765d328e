//! Credential store: the access credential, the refresh credential and the cached user profile.
//!
//! Stores persist a [`StoredSession`] under three fixed keys (`token`, `refreshToken` and `user`)
//! and `clear` removes all three at once.
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::token::{AccessToken, RefreshToken};

pub mod file;

pub use file::FileCredentialStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("reading or writing credentials: `{0}`")]
    Io(String),
    #[error("(de)serializing credentials: `{0}`")]
    Serde(String),
    #[error("acquiring credential store lock")]
    PoisonError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
}

impl Credential {
    pub fn new(access_token: AccessToken, refresh_token: Option<RefreshToken>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }
}

/// Cached profile of the signed in user, as returned next to the tokens on login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn username(&self) -> Option<&str> {
        self.get("username").and_then(Value::as_str)
    }

    pub fn organization_status(&self) -> Option<&str> {
        self.get("organization_status").and_then(Value::as_str)
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.get("disabled_reason")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
    }

    /// Shallow merge: keys in `updates` replace the cached ones.
    pub fn merge(&mut self, updates: Map<String, Value>) {
        self.0.extend(updates);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for UserProfile {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Everything a store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<AccessToken>,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<RefreshToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl StoredSession {
    pub fn credential(&self) -> Option<Credential> {
        self.token
            .as_ref()
            .map(|token| Credential::new(token.to_owned(), self.refresh_token.to_owned()))
    }
}

/// Persistence contract used by the request pipeline.
///
/// Implementations only need to load, atomically update and clear a [`StoredSession`]; the
/// accessors the pipeline uses are derived from those.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<StoredSession, StoreError>;

    fn update(&self, apply: &mut dyn FnMut(&mut StoredSession)) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;

    fn get(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.load()?.credential())
    }

    /// Replaces both tokens. A credential without refresh token removes the stored one.
    fn set(&self, credential: &Credential) -> Result<(), StoreError> {
        self.update(&mut |session| {
            session.token = Some(credential.access_token.to_owned());
            session.refresh_token = credential.refresh_token.to_owned();
        })
    }

    fn set_access_token(&self, access_token: &str) -> Result<(), StoreError> {
        self.update(&mut |session| session.token = Some(access_token.to_owned()))
    }

    fn set_refresh_token(&self, refresh_token: &str) -> Result<(), StoreError> {
        self.update(&mut |session| session.refresh_token = Some(refresh_token.to_owned()))
    }

    fn user(&self) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.load()?.user)
    }

    fn set_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        self.update(&mut |session| session.user = Some(user.to_owned()))
    }
}

/// Store that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<StoredSession>,
}

impl MemoryCredentialStore {
    pub fn new(session: StoredSession) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self::new(StoredSession {
            token: Some(credential.access_token),
            refresh_token: credential.refresh_token,
            user: None,
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredSession, StoreError> {
        let session = self.session.lock().map_err(|_| StoreError::PoisonError)?;
        Ok(session.to_owned())
    }

    fn update(&self, apply: &mut dyn FnMut(&mut StoredSession)) -> Result<(), StoreError> {
        let mut session = self.session.lock().map_err(|_| StoreError::PoisonError)?;
        apply(&mut session);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut session = self.session.lock().map_err(|_| StoreError::PoisonError)?;
        *session = StoredSession::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(value: Value) -> UserProfile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_store_has_no_credential() {
        let store = MemoryCredentialStore::default();
        assert_eq!(store.get().unwrap(), None);
        assert_eq!(store.user().unwrap(), None);
    }

    #[test]
    fn refresh_token_without_access_token_is_no_credential() {
        let store = MemoryCredentialStore::new(StoredSession {
            refresh_token: Some("r1".into()),
            ..Default::default()
        });
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn set_access_token_keeps_refresh_token() {
        let store =
            MemoryCredentialStore::with_credential(Credential::new("tok1".into(), Some("r1".into())));

        store.set_access_token("tok2").unwrap();

        let credential = store.get().unwrap().unwrap();
        assert_eq!(credential.access_token(), "tok2");
        assert_eq!(credential.refresh_token().map(String::as_str), Some("r1"));
    }

    #[test]
    fn set_without_refresh_token_removes_it() {
        let store =
            MemoryCredentialStore::with_credential(Credential::new("tok1".into(), Some("r1".into())));

        store.set(&Credential::new("tok2".into(), None)).unwrap();

        assert_eq!(store.get().unwrap(), Some(Credential::new("tok2".into(), None)));
    }

    #[test]
    fn clear_removes_every_key() {
        let store =
            MemoryCredentialStore::with_credential(Credential::new("tok1".into(), Some("r1".into())));
        store.set_user(&profile(json!({ "username": "dispatch" }))).unwrap();

        store.clear().unwrap();

        assert_eq!(store.load().unwrap(), StoredSession::default());
    }

    #[test]
    fn stored_session_uses_fixed_keys() {
        let session = StoredSession {
            token: Some("tok1".into()),
            refresh_token: Some("r1".into()),
            user: Some(profile(json!({ "id": 7 }))),
        };

        assert_eq!(
            serde_json::to_value(&session).unwrap(),
            json!({ "token": "tok1", "refreshToken": "r1", "user": { "id": 7 } })
        );
    }

    #[test]
    fn profile_merge_and_accessors() {
        let mut user = profile(json!({
            "username": "ops",
            "organization_status": "active",
            "disabled_reason": ""
        }));

        user.merge(Map::from_iter([(
            "organization_status".to_string(),
            json!("suspended"),
        )]));

        assert_eq!(user.username(), Some("ops"));
        assert_eq!(user.organization_status(), Some("suspended"));
        assert_eq!(user.disabled_reason(), None);
    }
}
