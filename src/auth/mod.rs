use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;

/// Access tag carried by every session token.
pub const ACCESS_AUTH: &str = "auth";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub access: String,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            sub: user_id,
            access: ACCESS_AUTH.to_string(),
            iat: Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token generation error: {0}")]
    Generation(String),

    #[error("Token secret is not configured")]
    InvalidSecret,

    #[error("Invalid token")]
    Invalid,
}

/// Mint a signed auth token for the given user id.
pub fn mint(user_id: Uuid) -> Result<String, TokenError> {
    let secret = &config::config().security.token_secret;
    if secret.is_empty() {
        return Err(TokenError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &Claims::new(user_id), &encoding_key)
        .map_err(|e| TokenError::Generation(e.to_string()))
}

/// Verify a token's signature and structure, returning its claims.
///
/// Tokens carry no expiry claim; revocation works by removing the token from
/// the user's stored token list, so exp validation is disabled here.
pub fn verify(token: &str) -> Result<Claims, TokenError> {
    let secret = &config::config().security.token_secret;
    if secret.is_empty() {
        return Err(TokenError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims = Default::default();

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|_| TokenError::Invalid)
}
