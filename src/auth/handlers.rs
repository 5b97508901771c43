use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::params;
use serde::Deserialize;
use serde_json::json;

use crate::auth::password::{hash_password, verify_password};
use crate::db::is_unique_violation;
use crate::db::models::Profile;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::social::profile::{find_user_by_email, MAX_USERNAME_LEN};
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_HANDLER_LEN: usize = 30;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub handler: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> AppResult<()> {
        let email = self.email.trim();
        let looks_like_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !looks_like_email {
            return Err(AppError::BadRequest("A valid email is required".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let username = self.username.trim();
        if username.is_empty() {
            return Err(AppError::BadRequest("Username is required".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::BadRequest(format!(
                "Username must be {MAX_USERNAME_LEN} characters or less"
            )));
        }

        let handler = self.handler.trim();
        if handler.is_empty() {
            return Err(AppError::BadRequest("Handler is required".into()));
        }
        if handler.len() > MAX_HANDLER_LEN
            || !handler
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AppError::BadRequest(format!(
                "Handler may only contain letters, digits and underscores (max {MAX_HANDLER_LEN})"
            )));
        }
        Ok(())
    }
}

/// bcrypt is deliberately slow, so it runs off the async workers.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<Response> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();
    let handler = req.handler.trim().to_string();
    let username = req.username.trim().to_string();

    {
        let conn = state.db.get()?;
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 OR handler = ?2",
            params![email, handler],
            |r| r.get(0),
        )?;
        if taken {
            return Err(AppError::Conflict("Email or handler already in use".into()));
        }
    }

    let cost = state.config.auth.bcrypt_cost;
    let password = req.password;
    let password_hash = blocking(move || hash_password(&password, cost)).await?;

    let user_id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    // Two registrations can both pass the check above; the unique index decides.
    conn.execute(
        "INSERT INTO users (id, email, handler, username, password_hash)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, email, handler, username, password_hash],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Email or handler already in use".into())
        } else {
            AppError::Database(e)
        }
    })?;

    tracing::info!(user_id = %user_id, handler = %handler, "user registered");
    Ok((StatusCode::CREATED, Json(json!({ "success": true }))).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let email = req.email.trim().to_lowercase();
    let user = {
        let conn = state.db.get()?;
        find_user_by_email(&conn, &email)?
    }
    .ok_or_else(|| AppError::Unauthorized("Email does not exist".into()))?;

    let password = req.password;
    let hash = user.password_hash.clone();
    let matches = blocking(move || Ok(verify_password(&password, &hash))).await?;
    if !matches {
        tracing::debug!(user_id = %user.id, "login rejected");
        return Err(AppError::Unauthorized("Wrong password".into()));
    }

    let token = state
        .tokens
        .issue(&user.id)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(json!({ "token": token })))
}

pub async fn verify_token(CurrentUser(user): CurrentUser) -> Json<Profile> {
    Json(user.profile())
}
