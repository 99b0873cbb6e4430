use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use jsonwebtoken::{encode, EncodingKey, Header};
use tracing::{info, warn};

use norichat_db::{Database, DEFAULT_SERVER_ID};
use norichat_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::ApiError;
use crate::password;

/// Tokens are valid for seven days from issue.
const TOKEN_TTL_SECS: i64 = 7 * 86_400;

const MAX_USERNAME_CHARS: usize = 32;
const MAX_PASSWORD_LEN: usize = 128;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("username and password required"));
    }
    if req.username.chars().count() > MAX_USERNAME_CHARS || req.password.len() > MAX_PASSWORD_LEN {
        return Err(ApiError::bad_request("username or password too long"));
    }

    // Hashing and the store round-trips are blocking; keep them off the
    // async runtime.
    let response = tokio::task::spawn_blocking(move || {
        let taken = state
            .db
            .find_user_by_username(&req.username)
            .map_err(|e| {
                warn!("register lookup failed: {e:#}");
                ApiError::internal("failed to create user")
            })?
            .is_some();
        if taken {
            return Err(ApiError::conflict("username already taken"));
        }

        let user = state
            .db
            .create_user(&req.username, &password::hash_password(&req.password))
            .map_err(|e| {
                warn!("create_user failed: {e:#}");
                ApiError::internal("failed to create user")
            })?;

        // Every account starts out in the default server.
        state
            .db
            .add_membership(user.id, DEFAULT_SERVER_ID)
            .map_err(|e| {
                warn!("add_membership failed: {e:#}");
                ApiError::internal("failed to create user")
            })?;

        let token = create_token(&state.jwt_secret, user.id, &user.username)
            .map_err(|_| ApiError::internal("failed to create user"))?;

        info!("registered {} ({})", user.username, user.id);
        Ok(AuthResponse {
            token,
            user_id: user.id,
            username: user.username,
        })
    })
    .await
    .map_err(|_| ApiError::internal("failed to create user"))??;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("username and password required"));
    }

    let response = tokio::task::spawn_blocking(move || {
        let user = state
            .db
            .find_user_by_username(&req.username)
            .map_err(|e| {
                warn!("login lookup failed: {e:#}");
                ApiError::internal("failed to load user")
            })?
            .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

        if !password::verify_password(&req.password, &user.password_hash) {
            return Err(ApiError::unauthorized("invalid credentials"));
        }

        // Backfill the default-server membership; idempotent for accounts
        // that already have it.
        state
            .db
            .add_membership(user.id, DEFAULT_SERVER_ID)
            .map_err(|e| {
                warn!("add_membership failed: {e:#}");
                ApiError::internal("failed to load user")
            })?;

        let token = create_token(&state.jwt_secret, user.id, &user.username)
            .map_err(|_| ApiError::internal("failed to load user"))?;

        Ok(AuthResponse {
            token,
            user_id: user.id,
            username: user.username,
        })
    })
    .await
    .map_err(|_| ApiError::internal("failed to load user"))??;

    Ok(Json(response))
}

pub fn create_token(secret: &str, user_id: i64, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: chrono::Utc::now().timestamp() + TOKEN_TTL_SECS,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
