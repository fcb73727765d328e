//! Authenticated API client.
//!
//! Every request is stamped with the stored access credential on the way out and every failed
//! response is classified on the way back. Recoverable failures wait on a single shared
//! credential refresh and are replayed once; disabled accounts and unrecoverable sessions end
//! the session. Callers only ever get the successful response or their own original failure.
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::ApiError;
use crate::authenticator::authenticate_request;
use crate::classifier::{FailureClassifier, SessionOutcome};
use crate::config::ClientConfig;
use crate::credential::CredentialStore;
use crate::http_client::HttpClient;
use crate::refresh::{
    RefreshCoordinator, RefreshError, RefreshOutcome, build_refresh_request,
    evaluate_refresh_response, with_deadline,
};
use crate::request::{ApiResponse, RequestDescriptor};
use crate::session::{SessionSink, SessionTerminator};
use crate::token::AccessToken;

mod account;

/// Cheap to clone; clones share the credential store, the session sink and the refresh state.
pub struct ApiClient<C, S, K> {
    inner: Arc<ClientInner<C, S, K>>,
}

impl<C, S, K> Clone for ApiClient<C, S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ClientInner<C, S, K> {
    http_client: C,
    store: S,
    sink: K,
    base_url: Url,
    login_path: String,
    refresh_path: String,
    refresh_timeout: Option<Duration>,
    classifier: FailureClassifier,
    terminator: SessionTerminator,
    coordinator: RefreshCoordinator,
}

impl<C, S, K> ApiClient<C, S, K>
where
    C: HttpClient + 'static,
    S: CredentialStore + 'static,
    K: SessionSink + 'static,
{
    pub fn new(http_client: C, store: S, sink: K, config: ClientConfig) -> Self {
        let classifier = config
            .classifier
            .covering_endpoints(&config.login_path, &config.refresh_path);
        Self {
            inner: Arc::new(ClientInner {
                http_client,
                store,
                sink,
                base_url: config.base_url,
                login_path: config.login_path,
                refresh_path: config.refresh_path,
                refresh_timeout: config.refresh_timeout,
                classifier: FailureClassifier::new(classifier),
                terminator: SessionTerminator::new(config.routes),
                coordinator: RefreshCoordinator::new(),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn sink(&self) -> &K {
        &self.inner.sink
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Sends `request` through the authentication pipeline.
    ///
    /// Non-2xx responses come back as [`ApiError::Status`] holding the original failing
    /// response, whatever the pipeline did with the session in between.
    pub async fn send(&self, mut request: RequestDescriptor) -> Result<ApiResponse, ApiError> {
        loop {
            let response = self.inner.dispatch(&mut request).await?;
            if response.status().is_success() {
                return Ok(response);
            }

            match self.inner.classifier.classify(&request, &response) {
                SessionOutcome::DisabledAccount(reason) => {
                    self.inner
                        .terminator
                        .end_disabled(&self.inner.store, &self.inner.sink, &reason);
                }
                SessionOutcome::RecoverableSessionFailure => {
                    if let Some(access_token) = self.recover(&request).await {
                        request.mark_retried();
                        match request.set_bearer(&access_token) {
                            Ok(()) => {
                                debug!(request_id = %request.id(), path = request.path(), "replaying request");
                                continue;
                            }
                            Err(err) => {
                                warn!(request_id = %request.id(), "refreshed access token is not a valid header value: {err}");
                                self.inner
                                    .terminator
                                    .end_expired(&self.inner.store, &self.inner.sink);
                            }
                        }
                    }
                }
                SessionOutcome::LoginAttempt
                | SessionOutcome::RefreshAttempt
                | SessionOutcome::Unclassified => {}
            }

            return Err(ApiError::from_response(response));
        }
    }

    /// Waits for a refreshed access token, or ends the session when there is no way to get one.
    async fn recover(&self, request: &RequestDescriptor) -> Option<AccessToken> {
        let inner = &self.inner;
        if request.is_retried() {
            debug!(request_id = %request.id(), "replayed request rejected again");
            inner.terminator.end_expired(&inner.store, &inner.sink);
            return None;
        }
        if !inner.has_refresh_token() {
            debug!(request_id = %request.id(), "no refresh token to recover the session with");
            inner.terminator.end_expired(&inner.store, &inner.sink);
            return None;
        }

        let refresh = inner.coordinator.join_or_start(|| {
            let inner = Arc::clone(inner);
            async move { inner.refresh_session().await }
        });
        // A failed refresh already ended the session.
        match refresh.await {
            Ok(access_token) => Some(access_token),
            Err(err) => {
                debug!(request_id = %request.id(), "not replaying request: {err}");
                None
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::post(path).with_json(body)?)
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::put(path).with_json(body)?).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::patch(path).with_json(body)?)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::delete(path)).await
    }
}

impl<C, S, K> ClientInner<C, S, K>
where
    C: HttpClient,
    S: CredentialStore,
    K: SessionSink,
{
    async fn dispatch(&self, request: &mut RequestDescriptor) -> Result<ApiResponse, ApiError> {
        authenticate_request(&self.store, request);
        let http_request = request.to_http_request(&self.base_url)?;

        debug!(
            request_id = %request.id(),
            method = %request.method(),
            path = request.path(),
            retried = request.is_retried(),
            "sending request"
        );
        let response = ApiResponse::from(self.http_client.send(http_request).await?);
        debug!(request_id = %request.id(), status = %response.status(), "response received");

        Ok(response)
    }

    fn has_refresh_token(&self) -> bool {
        match self.store.load() {
            Ok(session) => session.refresh_token.is_some(),
            Err(err) => {
                warn!("reading stored refresh token: {err}");
                false
            }
        }
    }

    /// Body of the shared refresh. Ends the session itself on failure, so it happens once no
    /// matter how many requests are waiting.
    async fn refresh_session(&self) -> RefreshOutcome {
        let outcome = with_deadline(self.refresh_timeout, self.request_new_access_token()).await;
        match &outcome {
            Ok(_) => info!("credentials refreshed"),
            Err(err) => {
                warn!("credential refresh failed: {err}");
                self.terminator.end_expired(&self.store, &self.sink);
            }
        }
        outcome
    }

    // Goes straight to the transport: a rejected refresh is handled by `refresh_session`, never
    // classified.
    async fn request_new_access_token(&self) -> RefreshOutcome {
        let refresh_token = self
            .store
            .load()
            .map_err(|e| RefreshError::Store(e.to_string()))?
            .refresh_token
            .ok_or(RefreshError::MissingRefreshToken)?;

        let mut request = build_refresh_request(&self.refresh_path, &refresh_token)?;
        authenticate_request(&self.store, &mut request);
        let http_request = request
            .to_http_request(&self.base_url)
            .map_err(|e| RefreshError::Encode(e.to_string()))?;

        debug!(request_id = %request.id(), path = request.path(), "requesting new access token");
        let response = self
            .http_client
            .send(http_request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let grant = evaluate_refresh_response(response)?;

        self.store
            .set_access_token(&grant.access)
            .map_err(|e| RefreshError::Store(e.to_string()))?;
        if let Some(refresh_token) = &grant.refresh {
            self.store
                .set_refresh_token(refresh_token)
                .map_err(|e| RefreshError::Store(e.to_string()))?;
        }

        Ok(grant.access)
    }
}
