use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use problem_hub_core::{
    model::{Comment, Problem, ProblemId, ReminderSettings, Solution, Status, Subtask, Template, TimeLog},
    permissions::{AccessLevel, Grant},
    problems::{NewProblem, NewSolution, ProblemEdit, SearchQuery},
    tags,
};
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState, AuthContext};

fn parse_status(raw: Option<&str>) -> Result<Option<Status>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty() && *s != "all") {
        Some(s) => Ok(Some(s.parse()?)),
        None => Ok(None),
    }
}

pub async fn list(State(state): State<AppState>, AuthContext(ctx): AuthContext) -> ApiResult<Vec<Problem>> {
    Ok(Json(state.problems.list_accessible(&ctx)?))
}

pub async fn create(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Json(req): Json<NewProblem>,
) -> ApiResult<Problem> {
    Ok(Json(state.problems.create(&ctx, req)?))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
) -> ApiResult<Problem> {
    Ok(Json(state.problems.get(&ctx, id)?))
}

pub async fn edit(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<ProblemEdit>,
) -> ApiResult<Problem> {
    Ok(Json(state.problems.edit(&ctx, id, req)?))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
) -> Result<StatusCode, ApiError> {
    state.problems.delete(&ctx, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    status: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Problem> {
    let status = parse_status(req.status.as_deref())?
        .ok_or_else(|| problem_hub_core::HubError::missing("status"))?;
    Ok(Json(state.problems.update_status(&ctx, id, status)?))
}

#[derive(Deserialize)]
pub struct TitleRequest {
    title: Option<String>,
}

pub async fn add_subtask(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<TitleRequest>,
) -> ApiResult<Subtask> {
    Ok(Json(state.problems.add_subtask(&ctx, id, req.title)?))
}

pub async fn toggle_subtask(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path((id, subtask_id)): Path<(ProblemId, u64)>,
) -> ApiResult<Subtask> {
    Ok(Json(state.problems.toggle_subtask(&ctx, id, subtask_id)?))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    text: Option<String>,
}

pub async fn add_comment(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<Comment> {
    Ok(Json(state.problems.add_comment(&ctx, id, req.text)?))
}

#[derive(Deserialize)]
pub struct TimeLogRequest {
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    description: String,
}

pub async fn log_time(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<TimeLogRequest>,
) -> ApiResult<TimeLog> {
    Ok(Json(state.problems.log_time(&ctx, id, req.minutes, req.description)?))
}

pub async fn add_solution(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<NewSolution>,
) -> ApiResult<Solution> {
    Ok(Json(state.problems.add_solution(&ctx, id, req)?))
}

pub async fn implement_solution(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path((id, solution_id)): Path<(ProblemId, u64)>,
) -> ApiResult<Solution> {
    Ok(Json(state.problems.implement_solution(&ctx, id, solution_id)?))
}

#[derive(Deserialize)]
pub struct ShareRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    permission_type: String,
}

pub async fn share(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<ShareRequest>,
) -> ApiResult<Grant> {
    let level: AccessLevel = req.permission_type.parse()?;
    Ok(Json(state.problems.share(&ctx, id, req.username.trim(), level)?))
}

pub async fn sharing(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
) -> ApiResult<Vec<Grant>> {
    Ok(Json(state.problems.sharing(&ctx, id)?))
}

#[derive(Deserialize)]
pub struct FilterParams {
    category: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

pub async fn filter(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Query(params): Query<FilterParams>,
) -> ApiResult<Vec<Problem>> {
    let status = parse_status(params.status.as_deref())?;
    Ok(Json(state.problems.filter(
        &ctx,
        params.category.as_deref(),
        status,
        params.search.as_deref(),
    )?))
}

/// `tags` is a comma separated list; every listed tag must be present.
#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    category: Option<String>,
    status: Option<String>,
    tags: Option<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

pub async fn search(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Problem>> {
    let query = SearchQuery {
        q: params.q,
        category: params.category.filter(|c| !c.is_empty()),
        status: parse_status(params.status.as_deref())?,
        tags: params.tags.as_deref().map(tags::split_list).unwrap_or_default(),
        date_from: params.date_from,
        date_to: params.date_to,
    };
    Ok(Json(state.problems.search(&ctx, &query)?))
}

#[derive(Deserialize)]
pub struct TagQuery {
    #[serde(default)]
    q: String,
}

pub async fn tag_autocomplete(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Query(params): Query<TagQuery>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.problems.tag_autocomplete(&ctx, &params.q)?))
}

#[derive(Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    text: String,
}

pub async fn tag_suggestions(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Query(params): Query<SuggestQuery>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.problems.tag_suggestions(&ctx, &params.text)?))
}

#[derive(Deserialize)]
pub struct TemplateRequest {
    name: Option<String>,
}

pub async fn save_as_template(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<ProblemId>,
    Json(req): Json<TemplateRequest>,
) -> ApiResult<Template> {
    Ok(Json(state.problems.save_as_template(&ctx, id, req.name)?))
}

pub async fn list_templates(
    State(state): State<AppState>,
    AuthContext(_): AuthContext,
) -> ApiResult<Vec<Template>> {
    Ok(Json(state.problems.templates()?))
}

pub async fn get_template(
    State(state): State<AppState>,
    AuthContext(_): AuthContext,
    Path(id): Path<u64>,
) -> ApiResult<Template> {
    Ok(Json(state.problems.template(id)?))
}

#[derive(Deserialize)]
pub struct FromTemplateRequest {
    due_date: Option<NaiveDate>,
}

pub async fn create_from_template(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Path(id): Path<u64>,
    Json(req): Json<FromTemplateRequest>,
) -> ApiResult<Problem> {
    Ok(Json(state.problems.create_from_template(&ctx, id, req.due_date)?))
}

pub async fn reminder_settings(
    State(state): State<AppState>,
    AuthContext(_): AuthContext,
) -> ApiResult<ReminderSettings> {
    Ok(Json(state.problems.reminder_settings()?))
}

pub async fn save_reminder_settings(
    State(state): State<AppState>,
    AuthContext(_): AuthContext,
    Json(settings): Json<ReminderSettings>,
) -> Result<StatusCode, ApiError> {
    state.problems.save_reminder_settings(settings)?;
    Ok(StatusCode::NO_CONTENT)
}
