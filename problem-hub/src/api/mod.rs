//! HTTP API over the problem tracker.
//!
//! Every handler resolves the caller into an [`AuthContext`] and hands the
//! wrapped [`RequestContext`] to the core services.

mod accounts;
mod auth_middleware;
mod groups;
mod problems;
mod views;

pub use auth_middleware::{extract_auth_context, AuthContext};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use problem_hub_core::{
    accounts::{Accounts, TokenIssuer},
    config::HubConfig,
    context::RequestContext,
    events::EventBus,
    groups::GroupDirectory,
    problems::ProblemService,
    scheduler::Maintenance,
    storage::JsonStore,
    HubError,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonStore>,
    pub problems: Arc<ProblemService>,
    pub groups: Arc<GroupDirectory>,
    pub accounts: Arc<Accounts>,
    pub tokens: TokenIssuer,
    pub maintenance: Arc<Maintenance>,
    pub events: EventBus,
}

impl AppState {
    pub fn new(store: Arc<JsonStore>, config: &HubConfig, events: EventBus) -> Self {
        Self {
            problems: Arc::new(ProblemService::new(store.clone(), events.clone())),
            groups: Arc::new(GroupDirectory::new(store.clone(), events.clone())),
            accounts: Arc::new(Accounts::new(store.clone())),
            tokens: TokenIssuer::new(&config.token_secret),
            maintenance: Arc::new(Maintenance::from_config(store.clone(), config, events.clone())),
            store,
            events,
        }
    }

    /// Replace the account service, e.g. one with cheaper hashing.
    pub fn with_accounts(mut self, accounts: Accounts) -> Self {
        self.accounts = Arc::new(accounts);
        self
    }
}

/// Error body `{"error": "..."}` with a status derived from the core error.
#[derive(Debug)]
pub struct ApiError(pub HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::AccessDenied => StatusCode::FORBIDDEN,
            HubError::Validation(_) | HubError::UnknownAccessLevel(_) => StatusCode::BAD_REQUEST,
            HubError::Conflict(_) => StatusCode::CONFLICT,
            HubError::Unauthorized => StatusCode::UNAUTHORIZED,
            HubError::Io { .. }
            | HubError::Parse { .. }
            | HubError::Encode(_)
            | HubError::PasswordHash(_)
            | HubError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Admin-only endpoints.
fn require_admin(ctx: &RequestContext) -> Result<(), ApiError> {
    if ctx.is_admin {
        Ok(())
    } else {
        Err(HubError::AccessDenied.into())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/backup", post(accounts::backup_now))
        .route("/problems", get(problems::list).post(problems::create))
        .route(
            "/problems/{id}",
            get(problems::get_one)
                .put(problems::edit)
                .delete(problems::delete),
        )
        .route("/problems/{id}/status", post(problems::update_status))
        .route("/problems/{id}/subtasks", post(problems::add_subtask))
        .route(
            "/problems/{id}/subtasks/{subtask_id}/toggle",
            post(problems::toggle_subtask),
        )
        .route("/problems/{id}/comments", post(problems::add_comment))
        .route("/problems/{id}/time_logs", post(problems::log_time))
        .route("/problems/{id}/solutions", post(problems::add_solution))
        .route(
            "/problems/{id}/solutions/{solution_id}/implement",
            post(problems::implement_solution),
        )
        .route("/problems/{id}/share", post(problems::share))
        .route("/problems/{id}/sharing", get(problems::sharing))
        .route("/problems/{id}/template", post(problems::save_as_template))
        .route("/filter", get(problems::filter))
        .route("/search", get(problems::search))
        .route("/tags/autocomplete", get(problems::tag_autocomplete))
        .route("/tags/suggest", get(problems::tag_suggestions))
        .route("/templates", get(problems::list_templates))
        .route("/templates/{id}", get(problems::get_template))
        .route(
            "/templates/{id}/problems",
            post(problems::create_from_template),
        )
        .route(
            "/reminder_settings",
            get(problems::reminder_settings).post(problems::save_reminder_settings),
        )
        .route("/stats", get(views::stats))
        .route("/kanban", get(views::kanban))
        .route("/timeline", get(views::timeline))
        .route("/gantt", get(views::gantt))
        .route("/calendar", get(views::calendar))
        .route("/reports", get(views::reports))
        .route("/reports/advanced", get(views::advanced_reports))
        .route("/notifications", get(views::notifications))
        .route("/reminders", get(views::reminders))
        .route("/activity", get(views::activity_log))
        .route("/groups", get(groups::list).post(groups::create))
        .route("/groups/{id}", axum::routing::delete(groups::delete))
        .route("/groups/{id}/members", post(groups::add_member))
        .route("/groups/{id}/invite", post(groups::invite))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests;
