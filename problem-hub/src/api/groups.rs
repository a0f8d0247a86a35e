use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use problem_hub_core::model::{Group, GroupId};
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState, AuthContext};

/// Groups the caller belongs to.
pub async fn list(State(state): State<AppState>, AuthContext(ctx): AuthContext) -> ApiResult<Vec<Group>> {
    Ok(Json(state.groups.groups_for_user(&ctx.user_id)?))
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

pub async fn create(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<Group> {
    Ok(Json(state.groups.create(&ctx, &req.name, &req.description)?))
}

#[derive(Deserialize)]
pub struct MemberRequest {
    #[serde(default)]
    username: String,
}

pub async fn add_member(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<GroupId>,
    Json(req): Json<MemberRequest>,
) -> ApiResult<Group> {
    Ok(Json(state.groups.add_member(&ctx, id, req.username.trim())?))
}

#[derive(Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    email: String,
}

pub async fn invite(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<GroupId>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<Group> {
    Ok(Json(state.groups.invite(&ctx, id, &req.email)?))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<GroupId>,
) -> Result<StatusCode, ApiError> {
    state.groups.delete(&ctx, id)?;
    Ok(StatusCode::NO_CONTENT)
}
