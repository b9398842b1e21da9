//! Bearer token authentication

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::application::{Caller, Role};
use crate::error::AppError;

const TOKEN_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

/// HS256 tokens issued by the identity service.
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Caller, AppError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
            tracing::debug!("JWT validation failed: {e}");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;
        Ok(Caller { user_id: data.claims.sub, role: data.claims.role })
    }

    pub fn issue(&self, user_id: &str, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: (now + Duration::hours(TOKEN_EXPIRY_HOURS)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".into()))?;
        state.tokens.verify(token.trim())
    }
}
