//! Classification of failed responses into session outcomes.
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::request::{ApiResponse, RequestDescriptor};

pub const DEFAULT_LOGIN_PATTERN: &str = "token/";
pub const DEFAULT_REFRESH_PATTERN: &str = "token/refresh";
pub const SUBSCRIPTION_EXPIRED_MESSAGE: &str = "Subscription Expired. Contact Support.";
pub const ACCOUNT_SUSPENDED_MESSAGE: &str = "Account Suspended. Contact Support.";

/// What a failed response means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Wrong username or password; never refreshed, never redirected.
    LoginAttempt,
    /// The refresh endpoint itself rejected the call; never refreshed again.
    RefreshAttempt,
    /// The account was disabled by an administrator, carries the server's reason.
    DisabledAccount(String),
    /// The access credential is no longer accepted; a refresh may recover it.
    RecoverableSessionFailure,
    /// Anything else, handed back to the caller unchanged.
    Unclassified,
}

/// Route patterns and messages driving the classification.
///
/// Patterns are matched as substrings of the request path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub login_patterns: Vec<String>,
    pub refresh_patterns: Vec<String>,
    pub disabled_messages: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            login_patterns: vec![DEFAULT_LOGIN_PATTERN.to_string()],
            refresh_patterns: vec![DEFAULT_REFRESH_PATTERN.to_string()],
            disabled_messages: vec![
                SUBSCRIPTION_EXPIRED_MESSAGE.to_string(),
                ACCOUNT_SUSPENDED_MESSAGE.to_string(),
            ],
        }
    }
}

impl ClassifierConfig {
    /// Adds the client's own login and refresh endpoints to the patterns when none matches them.
    pub fn covering_endpoints(mut self, login_path: &str, refresh_path: &str) -> Self {
        if !login_path.is_empty() && !matches_any(login_path, &self.login_patterns) {
            self.login_patterns.push(login_path.to_string());
        }
        if !refresh_path.is_empty() && !matches_any(refresh_path, &self.refresh_patterns) {
            self.refresh_patterns.push(refresh_path.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailureClassifier {
    config: ClassifierConfig,
}

impl FailureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, request: &RequestDescriptor, response: &ApiResponse) -> SessionOutcome {
        if response.status() != StatusCode::UNAUTHORIZED {
            return SessionOutcome::Unclassified;
        }

        let path = request.path();
        let is_refresh = matches_any(path, &self.config.refresh_patterns);
        if matches_any(path, &self.config.login_patterns) && !is_refresh {
            return SessionOutcome::LoginAttempt;
        }
        if is_refresh {
            return SessionOutcome::RefreshAttempt;
        }

        match response.detail() {
            Some(detail) if self.config.disabled_messages.contains(&detail) => {
                SessionOutcome::DisabledAccount(detail)
            }
            _ => SessionOutcome::RecoverableSessionFailure,
        }
    }
}

fn matches_any(path: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| !pattern.is_empty() && path.contains(pattern.as_str()))
}
