//! Identity token codec
//!
//! Issues and verifies HS256-signed identity tokens. Expiry is decided from
//! the payload before the signature is checked, so a token past its `exp`
//! is reported as expired whether or not its signature is valid.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;

use crate::models::user::{Claims, Identity};

/// Why a token could not be issued or verified
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token signing secret is not configured")]
    Configuration,

    #[error("token codec failure: {0}")]
    Internal(String),
}

/// Just enough of the payload to decide expiry
#[derive(Deserialize)]
struct ExpiryPeek {
    exp: i64,
}

/// Signs and verifies identity tokens with a server-held secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    peek_validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec for `secret`
    ///
    /// # Errors
    /// `TokenError::Configuration` if the secret is empty. Callers treat this
    /// as fatal at startup.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Configuration);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // exp is checked against our own clock in `verify_at`
        validation.validate_exp = false;
        validation.leeway = 0;

        let mut peek_validation = Validation::new(Algorithm::HS256);
        peek_validation.insecure_disable_signature_validation();
        peek_validation.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            peek_validation,
        })
    }

    /// Issue a token for `identity` valid for `lifetime` from now
    pub fn issue(&self, identity: &Identity, lifetime: Duration) -> Result<String, TokenError> {
        self.issue_at(identity, lifetime, Utc::now().timestamp())
    }

    /// Issue a token with an explicit issued-at time (Unix seconds)
    pub fn issue_at(
        &self,
        identity: &Identity,
        lifetime: Duration,
        issued_at: i64,
    ) -> Result<String, TokenError> {
        let lifetime_secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims::new(identity, issued_at, lifetime_secs);

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Internal(e.to_string()))
    }

    /// Verify a token against the current time
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token as of `now` (Unix seconds)
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let peek = decode::<ExpiryPeek>(token, &self.decoding_key, &self.peek_validation)
            .map_err(classify)?;
        if now >= peek.claims.exp {
            return Err(TokenError::Expired);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(classify)?;
        Ok(data.claims)
    }
}

fn classify(error: jsonwebtoken::errors::Error) -> TokenError {
    match error.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::RsaFailedSigning
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::Crypto(_) => TokenError::Internal(error.to_string()),
        _ => TokenError::Invalid(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";
    const HOUR: Duration = Duration::from_secs(3600);

    fn alice(is_admin: bool) -> Identity {
        Identity {
            id: 42,
            username: "alice".to_string(),
            is_admin,
            is_super_admin: false,
            verified: true,
            wallet_address: None,
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET).unwrap()
    }

    #[test]
    fn test_empty_secret_is_configuration_error() {
        assert_matches!(TokenCodec::new(""), Err(TokenError::Configuration));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", codec());
        assert!(!debug.contains(SECRET));
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_issue_then_verify_returns_claims(#[case] is_admin: bool) {
        let codec = codec();
        let token = codec.issue_at(&alice(is_admin), 2 * HOUR, 1_000).unwrap();

        let claims = codec.verify_at(&token, 1_001).unwrap();
        assert_eq!(claims.id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.is_admin(), is_admin);
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp - claims.iat, 7_200);
        assert_eq!(claims.identity(), alice(is_admin));
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let token = codec.issue_at(&alice(false), HOUR, 0).unwrap();
        assert!(codec.verify_at(&token, 3_599).is_ok());
        assert_matches!(codec.verify_at(&token, 3_600), Err(TokenError::Expired));
    }

    #[test]
    fn test_issued_three_hours_ago_with_two_hour_lifetime_is_expired() {
        let codec = codec();
        let issued = Utc::now().timestamp() - 3 * 3600;
        let token = codec.issue_at(&alice(false), 2 * HOUR, issued).unwrap();
        assert_matches!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_expired_wins_over_bad_signature() {
        let other = TokenCodec::new("a-completely-different-signing-secret").unwrap();
        let token = other.issue_at(&alice(false), HOUR, 0).unwrap();
        assert_matches!(codec().verify_at(&token, 10_000), Err(TokenError::Expired));
    }

    #[test]
    fn test_other_secret_is_invalid() {
        let other = TokenCodec::new("a-completely-different-signing-secret").unwrap();
        let token = other.issue_at(&alice(false), HOUR, 0).unwrap();
        assert_matches!(codec().verify_at(&token, 10), Err(TokenError::Invalid(_)));
    }

    #[test]
    fn test_corrupted_signature_is_invalid() {
        let codec = codec();
        let token = codec.issue_at(&alice(false), HOUR, 0).unwrap();
        let mut bytes = token.into_bytes();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert_matches!(codec.verify_at(&corrupted, 10), Err(TokenError::Invalid(_)));
    }

    #[rstest]
    #[case("")]
    #[case("not-a-token")]
    #[case("a.b.c")]
    #[case("eyJhbGciOiJIUzI1NiJ9.e30.sig")]
    fn test_malformed_tokens_are_invalid(#[case] token: &str) {
        assert_matches!(codec().verify_at(token, 0), Err(TokenError::Invalid(_)));
    }

    #[test]
    fn test_payload_without_username_is_invalid() {
        #[derive(serde::Serialize)]
        struct Partial {
            id: i64,
            iat: i64,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Partial { id: 1, iat: 0, exp: 100 },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_matches!(codec().verify_at(&token, 10), Err(TokenError::Invalid(_)));
    }
}
