//! Bearer token claim decoding.
//!
//! Claims are read without checking the signature; the backend verifies
//! tokens; the client only needs the expiry and profile hints.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token must have three dot-separated segments")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token claims are not valid JSON: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("token expires at {expires_at}, inside the safety margin")]
    Expired { expires_at: DateTime<Utc> },
}

/// The claims the client cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Expiry as seconds since the epoch.
    pub exp: Option<f64>,
    pub user_id: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_admin: bool,
}

impl TokenClaims {
    /// `userId`, falling back to `id`, as a string.
    pub fn subject(&self) -> Option<String> {
        self.user_id
            .as_ref()
            .or(self.id.as_ref())
            .and_then(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp as i64, 0))
    }

    /// False once `now + margin` reaches the expiry. Tokens without `exp`
    /// never expire on the client side.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at() {
            Some(expires_at) => {
                let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
                expires_at >= now + margin
            }
            None => true,
        }
    }
}

/// Decode the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    if payload.is_empty() {
        return Err(TokenError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode and check expiry against `now + margin`.
pub fn validate(token: &str, now: DateTime<Utc>, margin: Duration) -> Result<TokenClaims, TokenError> {
    let claims = decode_claims(token)?;
    if !claims.is_valid_at(now, margin) {
        return Err(TokenError::Expired {
            expires_at: claims.expires_at().unwrap_or(now),
        });
    }
    Ok(claims)
}
