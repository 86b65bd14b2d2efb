//! Anti-CSRF correlation between the challenge redirect and the CAS callback.
//!
//! The token lives in two places: inside the protected state and in a
//! short-lived cookie. A callback is only trusted when both agree.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::properties::AuthProperties;

const TOKEN_BYTES: usize = 32;
const PROPERTY_PREFIX: &str = ".xsrf.";
const COOKIE_PREFIX: &str = ".cas.correlation.";

pub struct CorrelationGuard;

impl CorrelationGuard {
    /// Properties key the token is stored under for `scope`.
    pub fn property_key(scope: &str) -> String {
        format!("{PROPERTY_PREFIX}{scope}")
    }

    /// Cookie name carrying the side-channel copy for `scope`.
    pub fn cookie_name(scope: &str) -> String {
        format!("{COOKIE_PREFIX}{scope}")
    }

    /// Creates a fresh token, stores it in `properties` and returns the value to
    /// place in the side channel.
    pub fn generate(properties: &mut AuthProperties, scope: &str) -> String {
        let token = generate_token();
        properties.insert(Self::property_key(scope), token.clone());
        token
    }

    /// True iff both copies exist and are byte-equal. The properties copy is
    /// consumed whatever the result; the caller must drop the side channel.
    pub fn validate(properties: &mut AuthProperties, scope: &str, side_channel: Option<&str>) -> bool {
        let stored = properties.remove(&Self::property_key(scope));

        let (stored, presented) = match (stored, side_channel) {
            (Some(stored), Some(presented)) if !stored.is_empty() && !presented.is_empty() => {
                (stored, presented)
            }
            (stored, presented) => {
                debug!(
                    in_state = stored.is_some(),
                    in_cookie = presented.is_some(),
                    "correlation token missing"
                );
                return false;
            }
        };

        let matches: bool = stored.as_bytes().ct_eq(presented.as_bytes()).into();
        if !matches {
            debug!("correlation token mismatch");
        }
        matches
    }
}

fn generate_token() -> String {
    // 32 bytes of entropy -> URL-safe base64 without padding.
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_stored_and_returned() {
        let mut properties = AuthProperties::new();
        let token = CorrelationGuard::generate(&mut properties, "CAS");

        assert_eq!(properties.get(".xsrf.CAS"), Some(token.as_str()));
        // 32 bytes -> 43 base64url chars
        assert_eq!(token.len(), 43);
    }

    #[test]
    fn tokens_are_unique() {
        let mut a = AuthProperties::new();
        let mut b = AuthProperties::new();

        assert_ne!(
            CorrelationGuard::generate(&mut a, "CAS"),
            CorrelationGuard::generate(&mut b, "CAS")
        );
    }

    #[test]
    fn matching_token_validates_once() {
        let mut properties = AuthProperties::new();
        let token = CorrelationGuard::generate(&mut properties, "CAS");

        assert!(CorrelationGuard::validate(&mut properties, "CAS", Some(&token)));
        assert_eq!(properties.get(".xsrf.CAS"), None);
        assert!(!CorrelationGuard::validate(&mut properties, "CAS", Some(&token)));
    }

    #[test]
    fn mismatch_fails_and_consumes_token() {
        let mut properties = AuthProperties::new();
        CorrelationGuard::generate(&mut properties, "CAS");

        assert!(!CorrelationGuard::validate(&mut properties, "CAS", Some("forged")));
        assert_eq!(properties.get(".xsrf.CAS"), None);
    }

    #[test]
    fn missing_side_channel_fails() {
        let mut properties = AuthProperties::new();
        CorrelationGuard::generate(&mut properties, "CAS");

        assert!(!CorrelationGuard::validate(&mut properties, "CAS", None));
        assert_eq!(properties.get(".xsrf.CAS"), None);
    }

    #[test]
    fn missing_state_copy_fails() {
        let mut properties = AuthProperties::new();

        assert!(!CorrelationGuard::validate(&mut properties, "CAS", Some("token")));
    }

    #[test]
    fn scopes_do_not_cross() {
        let mut properties = AuthProperties::new();
        let token = CorrelationGuard::generate(&mut properties, "CAS");

        assert!(!CorrelationGuard::validate(&mut properties, "OtherCAS", Some(&token)));
        assert_eq!(properties.get(".xsrf.CAS"), Some(token.as_str()));
    }
}
