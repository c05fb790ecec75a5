use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

/// Bearer access token issued by the auth service.
///
/// The token is opaque to the client except for its expiry: when it is a
/// three-part signed token whose payload carries a numeric `exp` claim
/// (seconds since epoch), that claim drives proactive refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<f64>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the `exp` claim from the token payload.
    /// Returns `None` for tokens without a payload, undecodable payloads,
    /// or a missing/non-positive claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let payload = self.0.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let claims: Claims = serde_json::from_slice(&bytes).ok()?;
        let exp = claims.exp.filter(|exp| exp.is_finite() && *exp > 0.0)?;
        Utc.timestamp_opt(exp as i64, 0).single()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().map(|exp| Utc::now() >= exp).unwrap_or(false)
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at().map(|exp| exp - Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}
