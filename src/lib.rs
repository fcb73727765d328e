pub mod authenticator;
pub mod classifier;
pub mod client;
pub mod commands;
pub mod config;
pub mod credential;
pub mod http;
pub mod http_client;
pub mod parameters;
pub mod refresh;
pub mod request;
pub mod session;
pub mod token;

use ::http::StatusCode;
use thiserror::Error;

use crate::credential::StoreError;
use crate::http_client::HttpClientError;
use crate::request::ApiResponse;

pub use client::ApiClient;
pub use config::ClientConfig;

/// Errors surfaced to callers of the API client.
///
/// A failed HTTP call always surfaces as the original [`ApiError::Status`], even when the client
/// refreshed credentials or ended the session while handling it.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed with status `{}`: `{}`", .status, String::from_utf8_lossy(.body))]
    Status { status: StatusCode, body: Vec<u8> },
    #[error("sending request: `{0}`")]
    Transport(#[from] HttpClientError),
    #[error("encoding request: `{0}`")]
    Encode(String),
    #[error("decoding response: `{0}`")]
    Decode(String),
    #[error("invalid request url: `{0}`")]
    InvalidUrl(String),
    #[error("credential store: `{0}`")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn from_response(response: ApiResponse) -> Self {
        ApiError::Status {
            status: response.status(),
            body: response.into_body(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `detail` message of a JSON error body.
    pub fn detail(&self) -> Option<String> {
        match self {
            ApiError::Status { status, body } => {
                ApiResponse::new(*status, body.to_owned()).detail()
            }
            _ => None,
        }
    }
}
