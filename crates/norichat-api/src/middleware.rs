use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use norichat_types::api::Claims;

use crate::error::ApiError;

/// Signing secret made available to the auth middleware as an extension,
/// set once at startup.
#[derive(Clone)]
pub struct JwtSecret(pub Arc<str>);

/// Extract and validate the bearer JWT, injecting [`Claims`] for handlers.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let secret = req
        .extensions()
        .get::<JwtSecret>()
        .cloned()
        .ok_or_else(|| ApiError::internal("server misconfigured"))?;

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

    let claims =
        decode_token(&secret.0, token).ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// HS256 validation with no expiry leeway; the subject must be a positive
/// user id.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .ok()?;
    (data.claims.sub > 0).then_some(data.claims)
}
