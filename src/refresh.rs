//! Single-flight credential refresh.
//!
//! Any number of requests can fail with an expired access credential at the same time. The
//! first one to reach the [`RefreshCoordinator`] starts the refresh call, every later one attaches
//! to the same shared future until it settles. The refresh runs as its own task, so it settles
//! even when every waiter is dropped. The state goes back to idle as part of settling, so a
//! failed refresh never wedges the client and the next failure starts a fresh call.
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::Response;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::request::RequestDescriptor;
use crate::token::{AccessToken, RefreshToken};

pub const DEFAULT_REFRESH_PATH: &str = "token/refresh/";
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a refresh did not produce a new access credential.
///
/// Shared between every waiter, hence `Clone` and string payloads. Callers of the API client
/// never see it: they get their own original failure instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("building refresh request: `{0}`")]
    Encode(String),
    #[error("sending refresh request: `{0}`")]
    Transport(String),
    #[error("refresh rejected with status `{0}`: `{1}`")]
    Rejected(u16, String),
    #[error("refresh response has no access token")]
    MissingAccessToken,
    #[error("decoding refresh response: `{0}`")]
    Decode(String),
    #[error("storing refreshed credentials: `{0}`")]
    Store(String),
    #[error("refresh did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("refresh task did not finish: `{0}`")]
    Aborted(String),
}

pub type RefreshOutcome = Result<AccessToken, RefreshError>;

/// Handle on the in-flight refresh; every clone resolves to the same outcome.
pub type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    InFlight(SharedRefresh),
}

/// Owns the refresh state of one API client.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*lock(&self.state), RefreshState::InFlight(_))
    }

    /// Returns the in-flight refresh, or starts one with `start` when idle.
    ///
    /// Observing idle and storing the new in-flight refresh happen under one lock, with no await
    /// in between. The refresh is spawned on the current tokio runtime and resets the state to
    /// idle before any waiter sees its outcome.
    pub fn join_or_start<F, Fut>(&self, start: F) -> SharedRefresh
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let mut state = lock(&self.state);
        if let RefreshState::InFlight(in_flight) = &*state {
            debug!("attaching to in-flight credential refresh");
            return in_flight.clone();
        }

        debug!("starting credential refresh");
        let refresh = start();
        let state_handle = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let outcome = refresh.await;
            *lock(&state_handle) = RefreshState::Idle;
            outcome
        });
        let shared = async move {
            task.await
                .unwrap_or_else(|err| Err(RefreshError::Aborted(err.to_string())))
        }
        .boxed()
        .shared();

        *state = RefreshState::InFlight(shared.clone());
        shared
    }
}

// The state is only ever replaced whole, a poisoned lock still holds a consistent value.
fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounds `refresh` by `limit`; `None` waits for as long as it takes.
pub async fn with_deadline<Fut>(limit: Option<Duration>, refresh: Fut) -> RefreshOutcome
where
    Fut: Future<Output = RefreshOutcome>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, refresh)
            .await
            .unwrap_or(Err(RefreshError::TimedOut(limit))),
        None => refresh.await,
    }
}

/// Successful refresh response. The API may rotate the refresh token as well.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefreshGrant {
    pub access: AccessToken,
    #[serde(default)]
    pub refresh: Option<RefreshToken>,
}

#[derive(Deserialize)]
struct RawRefreshGrant {
    #[serde(default)]
    access: Option<AccessToken>,
    #[serde(default)]
    refresh: Option<RefreshToken>,
}

pub fn build_refresh_request(
    path: &str,
    refresh_token: &str,
) -> Result<RequestDescriptor, RefreshError> {
    RequestDescriptor::post(path)
        .with_json(&json!({ "refresh": refresh_token }))
        .map_err(|e| RefreshError::Encode(e.to_string()))
}

pub fn evaluate_refresh_response(res: Response<Vec<u8>>) -> Result<RefreshGrant, RefreshError> {
    let body = res.body();

    match res.status() {
        status if status.is_success() => {
            let raw: RawRefreshGrant = serde_json::from_slice(body).map_err(|e| {
                RefreshError::Decode(format!(
                    "{e}. Response body: {}",
                    String::from_utf8_lossy(body)
                ))
            })?;
            match raw.access {
                Some(access) if !access.is_empty() => Ok(RefreshGrant {
                    access,
                    refresh: raw.refresh.filter(|r| !r.is_empty()),
                }),
                _ => Err(RefreshError::MissingAccessToken),
            }
        }
        status => Err(RefreshError::Rejected(
            status.as_u16(),
            String::from_utf8_lossy(body).to_string(),
        )),
    }
}
