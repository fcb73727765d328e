use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type AccessToken = String;
pub type RefreshToken = String;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("decoding access token claims: `{0}`")]
    Decode(String),
    #[error("expiration `{0}` is out of range")]
    InvalidExpiration(i64),
}

/// Payload of an access token as issued by the API.
///
/// The signature is NOT verified: the client only reads these claims to report on the session,
/// the API remains the authority on whether a token is valid.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccessClaims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
}

impl AccessClaims {
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        jsonwebtoken::decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| ClaimsError::Decode(e.to_string()))
    }

    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>, ClaimsError> {
        self.exp
            .map(|exp| DateTime::from_timestamp(exp, 0).ok_or(ClaimsError::InvalidExpiration(exp)))
            .transpose()
    }

    /// A token without `exp` never expires.
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at(), Ok(Some(expires_at)) if expires_at < Utc::now())
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.as_ref().map(|id| match id {
            Value::String(s) => s.to_owned(),
            other => other.to_string(),
        })
    }
}

impl fmt::Display for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = self.user_id().unwrap_or_else(|| "unknown".into());
        match self.expires_at() {
            Ok(Some(expires_at)) => write!(f, "user {user}, expires at {}", expires_at.to_rfc3339()),
            _ => write!(f, "user {user}, no expiration"),
        }
    }
}
