//! JWT claim inspection
//!
//! The client never holds the signing key, so tokens are decoded without
//! signature verification. The result is informational only (expiry display)
//! and must never drive an authorization decision.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by backend access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Expiration time (seconds since epoch)
    pub exp: i64,
    /// Issued at
    #[serde(default)]
    pub iat: Option<i64>,
    /// Backend user id
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    /// "access" or "refresh"
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Decode the claims of a token without checking its signature or expiry
pub fn peek_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::InvalidToken(e.to_string()))
}

/// Expiry of a token, if it is a decodable JWT carrying `exp`
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    peek_claims(token).ok().and_then(|claims| claims.expires_at())
}
