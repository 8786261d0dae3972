//! Decoding of the bearer credential.
//!
//! Tokens are JWT-shaped (`header.payload.signature`). Only the payload is
//! inspected, for its `exp` claim; the signature is the backend's business.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    #[error("Malformed credential: {0}")]
    Malformed(String),

    #[error("Credential expired at {exp}")]
    Expired { exp: f64 },
}

/// Claims carried in the credential payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry in seconds since the epoch. Absent (or null) means never expires.
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Claims {
    /// Expired when `exp` is at or before `now` (whole seconds)
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), CredentialError> {
        match self.exp {
            Some(exp) if exp <= now.timestamp() as f64 => Err(CredentialError::Expired { exp }),
            _ => Ok(()),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.exp?;
        DateTime::from_timestamp(exp.trunc() as i64, 0)
    }
}

/// Opaque bearer token as persisted under the `token` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the payload segment into claims
    pub fn decode(&self) -> Result<Claims, CredentialError> {
        let segment = self
            .0
            .split('.')
            .nth(1)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CredentialError::Malformed("missing payload segment".to_string()))?;

        let bytes = Self::decode_segment(segment)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CredentialError::Malformed(format!("payload is not a claims object: {}", e)))
    }

    /// Decode and check expiry in one step
    pub fn validate(&self, now: DateTime<Utc>) -> Result<Claims, CredentialError> {
        let claims = self.decode()?;
        claims.check(now)?;
        Ok(claims)
    }

    /// Accept base64url (the JWT alphabet) and plain base64, padded or not.
    fn decode_segment(segment: &str) -> Result<Vec<u8>, CredentialError> {
        let trimmed = segment.trim_end_matches('=');
        URL_SAFE_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
            .map_err(|e| CredentialError::Malformed(format!("payload is not base64: {}", e)))
    }
}

impl From<String> for Credential {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
