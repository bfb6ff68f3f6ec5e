//! The bearer credential and its on-disk shape.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::TokenResponse;
use crate::error::AuthResult;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// An OAuth bearer credential.
///
/// An access token always carries an absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Builds a credential from a token endpoint response received at `now`.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> AuthResult<Self> {
        let expires_at = response.expires_at(now)?;
        Ok(Self::new(response.access_token, response.refresh_token, expires_at))
    }

    /// Applies a refresh response.
    ///
    /// The access token and expiry are replaced. The refresh token is
    /// replaced only when the provider rotated it.
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> AuthResult<Self> {
        let refresh_token = response
            .refresh_token
            .clone()
            .or_else(|| self.refresh_token.clone());
        let mut next = Self::from_response(response, now)?;
        next.refresh_token = refresh_token;
        Ok(next)
    }

    /// Returns the access token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token, if one was granted.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the literal expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token is expired at `now`, or will be within `margin`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        now > self.expires_at - margin
    }

    /// Returns true if the token is expired now, or will be within `margin`.
    pub fn is_expired(&self, margin: Duration) -> bool {
        self.is_expired_at(Utc::now(), margin)
    }

    /// Returns the time left before the literal expiry (negative once past).
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Unix timestamp as found in credential files; older files hold floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum UnixTime {
    Seconds(i64),
    Fractional(f64),
}

impl UnixTime {
    fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Seconds(secs) => DateTime::from_timestamp(secs, 0),
            Self::Fractional(secs) if secs.is_finite() => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9) as u32;
                DateTime::from_timestamp(whole as i64, nanos)
            }
            Self::Fractional(_) => None,
        }
    }
}

/// Serialized form of a [`Credential`].
///
/// `{"access_token": "...", "refresh_token": "..." | null, "token_expiry_time": <unix seconds>}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredCredential {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    token_expiry_time: Option<UnixTime>,
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: Some(credential.access_token.clone()),
            refresh_token: credential.refresh_token.clone(),
            token_expiry_time: Some(UnixTime::Seconds(credential.expires_at.timestamp())),
        }
    }
}

impl TryFrom<StoredCredential> for Credential {
    type Error = String;

    fn try_from(stored: StoredCredential) -> Result<Self, Self::Error> {
        let access_token = stored
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or("access_token is missing")?;
        let expires_at = stored
            .token_expiry_time
            .ok_or("token_expiry_time is missing")?
            .to_datetime()
            .ok_or("token_expiry_time is out of range")?;
        let refresh_token = stored.refresh_token.filter(|t| !t.is_empty());
        Ok(Self::new(access_token, refresh_token, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    fn response(refresh: Option<&str>, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: "fresh".to_string(),
            refresh_token: refresh.map(String::from),
            expires_in,
            token_type: Some("Bearer".to_string()),
        }
    }

    fn epoch(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn from_response_sets_expiry() {
        let now = epoch(1_700_000_000);
        let credential =
            Credential::from_response(response(Some("r1"), Some(1800)), now).unwrap();
        assert_eq!(credential.access_token(), "fresh");
        assert_eq!(credential.refresh_token(), Some("r1"));
        assert_eq!(credential.expires_at(), epoch(1_700_001_800));
    }

    #[test]
    fn missing_lifetime_defaults_to_an_hour() {
        let now = epoch(1_700_000_000);
        let credential = Credential::from_response(response(None, None), now).unwrap();
        assert_eq!(credential.expires_at(), epoch(1_700_003_600));
    }

    #[test]
    fn refresh_keeps_old_refresh_token_unless_rotated() {
        let now = epoch(1_700_000_000);
        let original = Credential::new("old", Some("r1".to_string()), now);

        let kept = original.refreshed(response(None, Some(3600)), now).unwrap();
        assert_eq!(kept.access_token(), "fresh");
        assert_eq!(kept.refresh_token(), Some("r1"));

        let rotated = original.refreshed(response(Some("r2"), Some(3600)), now).unwrap();
        assert_eq!(rotated.refresh_token(), Some("r2"));
    }

    #[test]
    fn out_of_range_lifetime_is_an_error() {
        let now = epoch(1_700_000_000);
        let err = Credential::from_response(response(None, Some(i64::MAX)), now).unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));

        // Fits a TimeDelta but not the date range.
        let original = Credential::new("old", Some("r1".to_string()), now);
        let err = original
            .refreshed(response(None, Some(i64::MAX / 1000)), now)
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse { .. }));
    }

    #[test]
    fn time_until_expiry_goes_negative() {
        let credential = Credential::new("a", None, epoch(1_700_000_000));
        assert_eq!(
            credential.time_until_expiry(epoch(1_699_999_400)),
            chrono::Duration::minutes(10)
        );
        assert!(credential.time_until_expiry(epoch(1_700_000_060)) < chrono::Duration::zero());
    }

    #[test]
    fn expiry_honours_margin() {
        let expires_at = epoch(1_700_000_000);
        let credential = Credential::new("a", None, expires_at);
        let margin = Duration::from_secs(60);

        assert!(!credential.is_expired_at(epoch(1_699_999_900), margin));
        assert!(credential.is_expired_at(epoch(1_699_999_950), margin));
        assert!(credential.is_expired_at(epoch(1_700_000_001), Duration::ZERO));
        assert!(!credential.is_expired_at(epoch(1_700_000_000), Duration::ZERO));
    }

    #[test]
    fn stored_roundtrip_writes_integer_seconds() {
        let credential = Credential::new("a", Some("r".to_string()), epoch(1_700_000_000));
        let json = serde_json::to_value(StoredCredential::from(&credential)).unwrap();
        assert_eq!(json["token_expiry_time"], 1_700_000_000);
        assert_eq!(json["refresh_token"], "r");
    }

    #[test]
    fn stored_accepts_fractional_expiry() {
        let stored: StoredCredential = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":null,"token_expiry_time":1700000000.75}"#,
        )
        .unwrap();
        let credential = Credential::try_from(stored).unwrap();
        assert_eq!(credential.expires_at().timestamp(), 1_700_000_000);
        assert!(credential.refresh_token().is_none());
    }

    #[test]
    fn stored_without_expiry_is_rejected() {
        let stored: StoredCredential =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
        let err = Credential::try_from(stored).unwrap_err();
        assert!(err.contains("token_expiry_time"));
    }

    #[test]
    fn debug_redacts_token() {
        let credential = Credential::new("very-secret", None, epoch(0));
        assert!(!format!("{:?}", credential).contains("very-secret"));
    }
}
