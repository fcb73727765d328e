use std::time::Duration;

use url::Url;

use crate::classifier::{ClassifierConfig, DEFAULT_LOGIN_PATTERN};
use crate::http::config::HttpConfig;
use crate::refresh::{DEFAULT_REFRESH_PATH, DEFAULT_REFRESH_TIMEOUT};
use crate::session::SessionRoutes;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";

/// Everything an [`ApiClient`](crate::ApiClient) needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: Url,
    pub login_path: String,
    pub refresh_path: String,
    /// `None` lets a stalled refresh hold its waiters indefinitely.
    pub refresh_timeout: Option<Duration>,
    pub http: HttpConfig,
    pub classifier: ClassifierConfig,
    pub routes: SessionRoutes,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: DEFAULT_LOGIN_PATTERN.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            refresh_timeout: Some(DEFAULT_REFRESH_TIMEOUT),
            http: HttpConfig::default(),
            classifier: ClassifierConfig::default(),
            routes: SessionRoutes::default(),
        }
    }

    pub fn with_refresh_timeout(self, refresh_timeout: Option<Duration>) -> Self {
        Self {
            refresh_timeout,
            ..self
        }
    }

    pub fn with_http(self, http: HttpConfig) -> Self {
        Self { http, ..self }
    }
}
