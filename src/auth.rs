//! # Access tokens
//!
//! Short-lived HS256 JSON Web Tokens carrying `{sub, exp, iat}`. Nothing is stored
//! server side: a token is valid exactly when its signature checks out against the
//! process-wide [`SigningSecret`] and the current time is before `exp`.
//!
//! ```
//! use chrono::Duration;
//! use fin_chat::auth::{SigningSecret, TokenService};
//!
//! let tokens = TokenService::new(SigningSecret::generate(), Duration::hours(1));
//! let token = tokens.issue("alice").unwrap();
//! assert_eq!(tokens.verify(&token).unwrap(), "alice");
//! ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, TokenError};

/// Token payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issue time, seconds since the Unix epoch.
    pub iat: i64,
}

/// HMAC key shared by every session for the lifetime of the process.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// 32 random bytes, hex encoded. Tokens signed with it die with the process.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes).into_bytes())
    }

    pub fn from_config(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(..)")
    }
}

/// Issues and verifies access tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: SigningSecret, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked in `verify_at` so the clock can be injected and `now == exp` rejects
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(&secret.0),
            decoding_key: DecodingKey::from_secret(&secret.0),
            validation,
            ttl,
        }
    }

    /// Sign a token for `username` that expires one TTL from now.
    pub fn issue(&self, username: &str) -> Result<String, TokenError> {
        self.issue_at(username, Utc::now())
    }

    /// Sign a token as if issued at `now`.
    pub fn issue_at(&self, username: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        if username.is_empty() {
            return Err(TokenError::EmptySubject);
        }

        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: username.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Check a token against the current time and return its username.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Check a token as of `now`.
    ///
    /// # Errors
    /// - [`AuthError::InvalidToken`] if the signature does not match or the payload is malformed.
    /// - [`AuthError::ExpiredToken`] if `now` is at or past the embedded expiry.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;

        if now.timestamp() >= data.claims.exp {
            return Err(AuthError::ExpiredToken);
        }
        Ok(data.claims.sub)
    }
}
