// src/utils/jwt.rs

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError};

pub const ADMIN_ROLE: &str = "admin";

/// Claims carried by the bearer tokens the platform issues to students and staff.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Student id, as a string.
    pub sub: String,
    /// Username; buffered answers are keyed by it.
    pub username: String,
    /// `student` or `admin`.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn student_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Signs a token for `student_id`. Tokens are issued by the platform's auth service;
/// this exists for tooling and tests.
pub fn sign_jwt(
    student_id: i64,
    username: &str,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = Utc::now().timestamp().max(0) as u64 + expiration_seconds;

    let claims = Claims {
        sub: student_id.to_string(),
        username: username.to_owned(),
        role: role.to_owned(),
        exp: expiration as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies signature and expiry of a token and returns its claims.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))
}

/// The token of an `Authorization: Bearer <token>` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

/// Authenticates the caller and stores its `Claims` in the request extensions.
/// Missing or invalid tokens get 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = bearer_token(req.headers()) else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims = verify_jwt(token, &config.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Lets only admins through. Runs after `auth_middleware`; callers without
/// the admin role get 403.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    match req.extensions().get::<Claims>() {
        None => Err(StatusCode::UNAUTHORIZED),
        Some(claims) if !claims.is_admin() => {
            tracing::warn!(username = %claims.username, "Non-admin called an admin route");
            Err(StatusCode::FORBIDDEN)
        }
        Some(_) => Ok(next.run(req).await),
    }
}
