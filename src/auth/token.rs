use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// JWT segments are base64url; some issuers keep the `=` padding
const JWT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Source of "now" in whole seconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// The registered claims we care about. The signature is never checked
/// here: the server is the authority on token validity.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub exp: Option<f64>,
}

/// Decode the payload segment of a JWT
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = JWT_ENGINE.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry claim as a timestamp, when the token carries a usable one
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token)?.exp?;
    DateTime::from_timestamp(exp as i64, 0)
}

/// Whether `token` must be treated as expired at `now_secs`
///
/// Undecodable tokens and tokens without an `exp` claim count as expired.
pub fn is_token_expired_at(token: &str, now_secs: i64) -> bool {
    match decode_claims(token).and_then(|claims| claims.exp) {
        Some(exp) => exp < now_secs as f64,
        None => true,
    }
}

/// Whether `token` must be treated as expired right now
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, SystemClock.now_secs())
}

/// Clock that only moves when told to, for tests
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(now: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(now))
    }

    pub(crate) fn set(&self, now: i64) {
        self.0.store(now, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Build an unsigned token with the given payload, for tests
#[cfg(test)]
pub(crate) fn token_with_payload(payload: &str) -> String {
    let header = JWT_ENGINE.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = JWT_ENGINE.encode(payload);
    format!("{}.{}.signature", header, body)
}

/// Build an unsigned token expiring at `exp`, for tests
#[cfg(test)]
pub(crate) fn token_expiring_at(exp: i64) -> String {
    token_with_payload(&format!(r#"{{"sub":1,"exp":{}}}"#, exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_past_expiry_is_expired() {
        assert!(is_token_expired_at(&token_expiring_at(NOW - 1), NOW));
        assert!(is_token_expired_at(&token_expiring_at(0), NOW));
    }

    #[test]
    fn test_future_expiry_is_valid() {
        assert!(!is_token_expired_at(&token_expiring_at(NOW + 1), NOW));
        assert!(!is_token_expired_at(&token_expiring_at(NOW + 3600), NOW));
    }

    #[test]
    fn test_expiry_equal_to_now_is_still_valid() {
        // Strictly-less-than comparison
        assert!(!is_token_expired_at(&token_expiring_at(NOW), NOW));
    }

    #[test]
    fn test_missing_exp_is_expired() {
        assert!(is_token_expired_at(&token_with_payload(r#"{"sub":1}"#), NOW));
        assert!(is_token_expired_at(&token_with_payload(r#"{"exp":null}"#), NOW));
    }

    #[test]
    fn test_undecodable_tokens_are_expired() {
        assert!(is_token_expired_at("", NOW));
        assert!(is_token_expired_at("not-a-jwt", NOW));
        assert!(is_token_expired_at("a.!!!.c", NOW));
        assert!(is_token_expired_at(&token_with_payload("[1,2,3]"), NOW));
        assert!(is_token_expired_at(&token_with_payload(r#"{"exp":"soon"}"#), NOW));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(format!(r#"{{"exp": {}}}"#, NOW + 60));
        assert!(payload.ends_with('='));
        let token = format!("h.{}.s", payload);
        assert!(!is_token_expired_at(&token, NOW));
    }

    #[test]
    fn test_expires_at() {
        let at = expires_at(&token_expiring_at(NOW)).unwrap();
        assert_eq!(at.timestamp(), NOW);
        assert!(expires_at("garbage").is_none());
    }

    #[test]
    fn test_system_clock_is_current() {
        let token = token_expiring_at(Utc::now().timestamp() + 600);
        assert!(!is_token_expired(&token));
        assert!(is_token_expired(&token_expiring_at(1)));
    }
}
