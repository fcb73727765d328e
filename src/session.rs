//! Session termination and the host capabilities it relies on.
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::credential::{CredentialStore, StoreError};

pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_DISABLED_ROUTE: &str = "/disabled";
pub const DEFAULT_EXPIRED_REASON: &str = "Subscription expired.";
pub const DEFAULT_SUSPENDED_REASON: &str = "Account suspended.";

/// Host side effects of ending a session: navigation and the transient disabled-reason slot.
///
/// The disabled reason only lives as long as the host session (a browser tab, a CLI process).
pub trait SessionSink: Send + Sync {
    fn current_route(&self) -> Option<String>;

    fn navigate_to(&self, route: &str);

    fn store_disabled_reason(&self, reason: &str);

    fn disabled_reason(&self) -> Option<String>;

    fn clear_disabled_reason(&self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRoutes {
    pub login: String,
    pub disabled: String,
}

impl Default for SessionRoutes {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_ROUTE.to_string(),
            disabled: DEFAULT_DISABLED_ROUTE.to_string(),
        }
    }
}

/// Where the host should take the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed,
    LoginRequired,
    Disabled(String),
}

#[derive(Debug, Clone, Default)]
pub struct SessionTerminator {
    routes: SessionRoutes,
}

impl SessionTerminator {
    pub fn new(routes: SessionRoutes) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &SessionRoutes {
        &self.routes
    }

    /// Ends a session whose credentials can no longer be renewed.
    pub fn end_expired<S, K>(&self, store: &S, sink: &K)
    where
        S: CredentialStore + ?Sized,
        K: SessionSink + ?Sized,
    {
        info!("session expired, signing out");
        clear_credentials(store);
        navigate_once(sink, &self.routes.login);
    }

    /// Ends the session of an administratively disabled account.
    pub fn end_disabled<S, K>(&self, store: &S, sink: &K, reason: &str)
    where
        S: CredentialStore + ?Sized,
        K: SessionSink + ?Sized,
    {
        info!(reason, "account disabled, signing out");
        sink.store_disabled_reason(reason);
        clear_credentials(store);
        navigate_once(sink, &self.routes.disabled);
    }

    /// Decides whether a protected screen may be shown.
    ///
    /// A cached profile of a suspended or expired organization records its reason, so later
    /// decisions go straight to the disabled screen.
    pub fn access_decision<S, K>(&self, store: &S, sink: &K) -> Result<AccessDecision, StoreError>
    where
        S: CredentialStore + ?Sized,
        K: SessionSink + ?Sized,
    {
        if let Some(reason) = sink.disabled_reason() {
            return Ok(AccessDecision::Disabled(reason));
        }

        let session = store.load()?;
        if let Some(user) = &session.user {
            let fallback = match user.organization_status() {
                Some("expired") => Some(DEFAULT_EXPIRED_REASON),
                Some("suspended") => Some(DEFAULT_SUSPENDED_REASON),
                _ => None,
            };
            if let Some(fallback) = fallback {
                let reason = user.disabled_reason().unwrap_or(fallback);
                sink.store_disabled_reason(reason);
                return Ok(AccessDecision::Disabled(reason.to_string()));
            }
        }

        match session.token {
            Some(_) => Ok(AccessDecision::Allowed),
            None => Ok(AccessDecision::LoginRequired),
        }
    }
}

fn clear_credentials<S: CredentialStore + ?Sized>(store: &S) {
    if let Err(err) = store.clear() {
        warn!("clearing stored credentials: {err}");
    }
}

fn navigate_once<K: SessionSink + ?Sized>(sink: &K, route: &str) {
    if sink.current_route().as_deref() != Some(route) {
        sink.navigate_to(route);
    }
}

/// [`SessionSink`] keeping the route and the disabled reason in memory.
#[derive(Debug, Default)]
pub struct InMemorySessionSink {
    route: Mutex<Option<String>>,
    disabled_reason: Mutex<Option<String>>,
    navigations: Mutex<Vec<String>>,
}

impl InMemorySessionSink {
    pub fn at_route(route: &str) -> Self {
        Self {
            route: Mutex::new(Some(route.to_string())),
            ..Default::default()
        }
    }

    /// Every route navigated to, oldest first.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).to_owned()
    }
}

impl SessionSink for InMemorySessionSink {
    fn current_route(&self) -> Option<String> {
        lock(&self.route).to_owned()
    }

    fn navigate_to(&self, route: &str) {
        *lock(&self.route) = Some(route.to_string());
        lock(&self.navigations).push(route.to_string());
    }

    fn store_disabled_reason(&self, reason: &str) {
        *lock(&self.disabled_reason) = Some(reason.to_string());
    }

    fn disabled_reason(&self) -> Option<String> {
        lock(&self.disabled_reason).to_owned()
    }

    fn clear_disabled_reason(&self) {
        *lock(&self.disabled_reason) = None;
    }
}

// Guarded values are only ever replaced whole, a poisoned lock still holds a consistent one.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, MemoryCredentialStore, StoredSession, UserProfile};
    use serde_json::json;

    fn signed_in_store() -> MemoryCredentialStore {
        let store =
            MemoryCredentialStore::with_credential(Credential::new("tok1".into(), Some("r1".into())));
        store
            .set_user(&serde_json::from_value::<UserProfile>(json!({ "username": "ops" })).unwrap())
            .unwrap();
        store
    }

    #[test]
    fn expired_session_clears_and_goes_to_login() {
        let store = signed_in_store();
        let sink = InMemorySessionSink::at_route("/vehicles");

        SessionTerminator::default().end_expired(&store, &sink);

        assert_eq!(store.load().unwrap(), StoredSession::default());
        assert_eq!(sink.navigations(), vec!["/login".to_string()]);
        assert_eq!(sink.disabled_reason(), None);
    }

    #[test]
    fn no_navigation_when_already_on_login() {
        let store = signed_in_store();
        let sink = InMemorySessionSink::at_route("/login");

        SessionTerminator::default().end_expired(&store, &sink);

        assert!(sink.navigations().is_empty());
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn disabled_session_records_reason() {
        let store = signed_in_store();
        let sink = InMemorySessionSink::default();

        SessionTerminator::default().end_disabled(
            &store,
            &sink,
            "Account Suspended. Contact Support.",
        );

        assert_eq!(store.load().unwrap(), StoredSession::default());
        assert_eq!(
            sink.disabled_reason().as_deref(),
            Some("Account Suspended. Contact Support.")
        );
        assert_eq!(sink.current_route().as_deref(), Some("/disabled"));

        SessionTerminator::default().end_disabled(&store, &sink, "again");
        assert_eq!(sink.navigations().len(), 1);
    }

    #[test]
    fn custom_routes() {
        let terminator = SessionTerminator::new(SessionRoutes {
            login: "/signin".into(),
            disabled: "/blocked".into(),
        });
        let sink = InMemorySessionSink::default();

        terminator.end_expired(&MemoryCredentialStore::default(), &sink);
        terminator.end_disabled(&MemoryCredentialStore::default(), &sink, "closed");

        assert_eq!(
            sink.navigations(),
            vec!["/signin".to_string(), "/blocked".to_string()]
        );
    }

    #[test]
    fn access_decisions() {
        let terminator = SessionTerminator::default();
        let sink = InMemorySessionSink::default();

        assert_eq!(
            terminator
                .access_decision(&MemoryCredentialStore::default(), &sink)
                .unwrap(),
            AccessDecision::LoginRequired
        );
        assert_eq!(
            terminator.access_decision(&signed_in_store(), &sink).unwrap(),
            AccessDecision::Allowed
        );

        sink.store_disabled_reason("Subscription Expired. Contact Support.");
        assert_eq!(
            terminator.access_decision(&signed_in_store(), &sink).unwrap(),
            AccessDecision::Disabled("Subscription Expired. Contact Support.".into())
        );
    }

    #[test]
    fn disabled_organization_in_cached_profile() {
        let terminator = SessionTerminator::default();
        let store = signed_in_store();
        let sink = InMemorySessionSink::default();
        store
            .set_user(
                &serde_json::from_value::<UserProfile>(json!({ "organization_status": "expired" }))
                    .unwrap(),
            )
            .unwrap();

        assert_eq!(
            terminator.access_decision(&store, &sink).unwrap(),
            AccessDecision::Disabled(DEFAULT_EXPIRED_REASON.into())
        );
        assert_eq!(sink.disabled_reason().as_deref(), Some(DEFAULT_EXPIRED_REASON));

        sink.clear_disabled_reason();
        store
            .set_user(
                &serde_json::from_value::<UserProfile>(json!({
                    "organization_status": "suspended",
                    "disabled_reason": "Unpaid invoices."
                }))
                .unwrap(),
            )
            .unwrap();
        assert_eq!(
            terminator.access_decision(&store, &sink).unwrap(),
            AccessDecision::Disabled("Unpaid invoices.".into())
        );
    }
}
