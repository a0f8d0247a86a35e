use axum::{extract::State, http::StatusCode, Json};
use problem_hub_core::scheduler::{Job, JobReport};
use serde::{Deserialize, Serialize};

use super::{require_admin, ApiError, ApiResult, AppState, AuthContext};

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .accounts
        .register(&req.username, &req.email, &req.password)?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user_id: String,
    is_admin: bool,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let ctx = state.accounts.login(req.username.trim(), &req.password)?;
    let token = state.tokens.issue(&ctx)?;
    Ok(Json(LoginResponse {
        token,
        user_id: ctx.user_id,
        is_admin: ctx.is_admin,
    }))
}

/// Run a backup right away instead of waiting for the schedule.
pub async fn backup_now(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<JobReport> {
    require_admin(&ctx)?;
    Ok(Json(state.maintenance.run(Job::Backup).await?))
}
