use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Datelike;
use problem_hub_core::{
    model::{now, today},
    views::{
        self, Activity, AdvancedReports, CalendarMonth, GanttBar, Kanban, Notification, Reminder,
        Reports, Stats, TimelineItem,
    },
};
use serde::Deserialize;

use super::{ApiResult, AppState, AuthContext};

pub async fn stats(State(state): State<AppState>, AuthContext(ctx): AuthContext) -> ApiResult<Stats> {
    let problems = state.problems.list_accessible(&ctx)?;
    Ok(Json(views::stats(&problems, today())))
}

pub async fn kanban(State(state): State<AppState>, AuthContext(ctx): AuthContext) -> ApiResult<Kanban> {
    Ok(Json(views::kanban(&state.problems.list_accessible(&ctx)?)))
}

pub async fn timeline(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<Vec<TimelineItem>> {
    Ok(Json(views::timeline(&state.problems.list_accessible(&ctx)?)))
}

pub async fn gantt(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<Vec<GanttBar>> {
    Ok(Json(views::gantt(&state.problems.list_accessible(&ctx)?)))
}

/// Defaults to the current month.
#[derive(Deserialize)]
pub struct CalendarParams {
    year: Option<i32>,
    month: Option<u32>,
}

pub async fn calendar(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
    Query(params): Query<CalendarParams>,
) -> ApiResult<CalendarMonth> {
    let current = today();
    let problems = state.problems.list_accessible(&ctx)?;
    Ok(Json(views::calendar(
        &problems,
        params.year.unwrap_or(current.year()),
        params.month.unwrap_or(current.month()),
    )?))
}

pub async fn reports(State(state): State<AppState>, AuthContext(ctx): AuthContext) -> ApiResult<Reports> {
    let problems = state.problems.list_accessible(&ctx)?;
    Ok(Json(views::reports(&problems, today())))
}

pub async fn advanced_reports(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<AdvancedReports> {
    Ok(Json(views::advanced_reports(&state.problems.list_accessible(&ctx)?)))
}

pub async fn notifications(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<Vec<Notification>> {
    let problems = state.problems.list_accessible(&ctx)?;
    Ok(Json(views::notifications(&problems, now())))
}

pub async fn reminders(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<Vec<Reminder>> {
    let problems = state.problems.list_accessible(&ctx)?;
    Ok(Json(views::reminders(&problems, today())))
}

pub async fn activity_log(
    State(state): State<AppState>,
    AuthContext(ctx): AuthContext,
) -> ApiResult<Vec<Activity>> {
    Ok(Json(views::activity_log(&state.problems.list_accessible(&ctx)?)))
}
