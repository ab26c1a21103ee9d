//! Bearer token issuance and verification
//!
//! Tokens are HMAC-SHA256 signed JWTs. The accepted algorithm is pinned in
//! the verifier: the `alg` header of an incoming token is never trusted, so
//! unsigned or alternately-signed tokens are rejected outright.
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secure_auth_core::{SessionId, TokenConfig, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by the bearer token
///
/// The field set is a stable wire format: changing it invalidates every
/// token already held by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user id
    pub sub: String,
    /// Session id the token is bound to
    pub sid: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Not before (Unix seconds)
    pub nbf: u64,
    /// Expiration (Unix seconds)
    pub exp: u64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl Claims {
    /// Claims for a freshly created session, valid from now until the
    /// configured expiration
    pub fn for_session(user_id: UserId, session_id: SessionId, config: &TokenConfig) -> Self {
        let now = Utc::now().timestamp().max(0) as u64;
        Self {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(config.expiration_secs),
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
        }
    }

    /// Parse the subject as a user id
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Malformed)
    }

    /// Parse the session id claim
    pub fn session_id(&self) -> Result<SessionId, TokenError> {
        self.sid.parse().map_err(|_| TokenError::Malformed)
    }
}

/// Token errors
///
/// `Malformed` and `SignatureInvalid` are kept apart for server-side logs
/// only. Callers facing the network must collapse them.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Malformed,

    #[error("Invalid token signature")]
    SignatureInvalid,

    #[error("Token expired or not yet valid")]
    Expired,

    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

/// Creates and verifies signed, time-boxed claims envelopes
pub trait TokenCodec: Send + Sync {
    /// Sign `claims` into a token string
    fn issue(&self, claims: &Claims) -> Result<String, TokenError>;

    /// Verify signature, issuer, audience and validity window
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;
}

/// HS256 JWT codec
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtCodec {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "aud", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }
}

impl TokenCodec for JwtCodec {
    fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::SignatureInvalid
                }
                _ => TokenError::Malformed,
            },
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> TokenConfig {
        TokenConfig::default()
    }

    fn sign_raw(claims: &Claims, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify_token() {
        let codec = JwtCodec::new(&config());
        let user_id = UserId(42);
        let session_id = SessionId::generate();

        let claims = Claims::for_session(user_id, session_id, &config());
        let token = codec.issue(&claims).expect("Failed to issue token");
        let verified = codec.verify(&token).expect("Failed to verify token");

        assert_eq!(verified, claims);
        assert_eq!(verified.user_id().unwrap(), user_id);
        assert_eq!(verified.session_id().unwrap(), session_id);
        assert_eq!(verified.iss, "secure-auth");
        assert_eq!(verified.aud, "secure-auth");
        assert_eq!(verified.exp - verified.iat, config().expiration_secs);
    }

    #[test]
    fn test_huge_lifetime_saturates() {
        let config = TokenConfig {
            expiration_secs: u64::MAX,
            ..config()
        };

        let claims = Claims::for_session(UserId(1), SessionId::generate(), &config);
        assert_eq!(claims.exp, u64::MAX);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_garbage_token() {
        let codec = JwtCodec::new(&config());
        assert!(matches!(
            codec.verify("invalid.token.here"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(codec.verify(""), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_secret() {
        let issuer = JwtCodec::new(&TokenConfig {
            secret: "secret1".to_string(),
            ..config()
        });
        let verifier = JwtCodec::new(&TokenConfig {
            secret: "secret2".to_string(),
            ..config()
        });

        let claims = Claims::for_session(UserId(1), SessionId::generate(), &config());
        let token = issuer.issue(&claims).unwrap();

        assert!(matches!(
            verifier.verify(&token),
            Err(TokenError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_expired_token() {
        let codec = JwtCodec::new(&config());
        let now = Utc::now().timestamp() as u64;

        let claims = Claims {
            iat: now - 7200,
            nbf: now - 7200,
            exp: now - 3600,
            ..Claims::for_session(UserId(1), SessionId::generate(), &config())
        };
        let token = codec.issue(&claims).unwrap();

        assert!(matches!(codec.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let codec = JwtCodec::new(&config());
        let now = Utc::now().timestamp() as u64;

        let claims = Claims {
            nbf: now + 3600,
            exp: now + 7200,
            ..Claims::for_session(UserId(1), SessionId::generate(), &config())
        };
        let token = codec.issue(&claims).unwrap();

        assert!(matches!(codec.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_other_algorithm_rejected_even_with_same_secret() {
        let codec = JwtCodec::new(&config());
        let claims = Claims::for_session(UserId(1), SessionId::generate(), &config());
        let token = sign_raw(&claims, Algorithm::HS512, &config().secret);

        assert!(codec.verify(&token).is_err());
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let codec = JwtCodec::new(&config());
        let claims = Claims::for_session(UserId(1), SessionId::generate(), &config());
        let signed = codec.issue(&claims).unwrap();

        // {"alg":"none","typ":"JWT"}
        let header = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0";
        let payload = signed.split('.').nth(1).unwrap();
        let unsigned = format!("{header}.{payload}.");

        assert!(codec.verify(&unsigned).is_err());
    }

    #[test]
    fn test_wrong_audience_and_issuer_rejected() {
        let codec = JwtCodec::new(&config());
        let base = Claims::for_session(UserId(1), SessionId::generate(), &config());

        let foreign_aud = Claims {
            aud: "someone-else".to_string(),
            ..base.clone()
        };
        let foreign_iss = Claims {
            iss: "someone-else".to_string(),
            ..base
        };

        assert!(codec.verify(&codec.issue(&foreign_aud).unwrap()).is_err());
        assert!(codec.verify(&codec.issue(&foreign_iss).unwrap()).is_err());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let codec = JwtCodec::new(&config());
        let claims = Claims::for_session(UserId(1), SessionId::generate(), &config());
        let token = codec.issue(&claims).unwrap();

        let mut chars: Vec<char> = token.chars().collect();
        let idx = token.rfind('.').unwrap() + 1;
        chars[idx] = if chars[idx] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert!(matches!(
            codec.verify(&tampered),
            Err(TokenError::SignatureInvalid | TokenError::Malformed)
        ));
    }

    #[test]
    fn test_unparsable_claim_values() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            sid: "not-a-uuid".to_string(),
            ..Claims::for_session(UserId(1), SessionId::generate(), &config())
        };

        assert!(matches!(claims.user_id(), Err(TokenError::Malformed)));
        assert!(matches!(claims.session_id(), Err(TokenError::Malformed)));
    }

    proptest! {
        #[test]
        fn prop_issued_tokens_verify(user in 1i64..i64::MAX) {
            let codec = JwtCodec::new(&config());
            let session_id = SessionId::generate();
            let token = codec
                .issue(&Claims::for_session(UserId(user), session_id, &config()))
                .unwrap();

            let claims = codec.verify(&token).unwrap();
            prop_assert_eq!(claims.user_id().unwrap(), UserId(user));
            prop_assert_eq!(claims.session_id().unwrap(), session_id);
        }
    }
}
