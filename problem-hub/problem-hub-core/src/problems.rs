//! Problem operations: creation, edits, sub-entities, sharing, search and
//! templates. Every mutation goes through [`JsonStore::update`].

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::events::{Event, EventBus};
use crate::model::{
    next_id, now, today, Comment, HistoryAction, HistoryEntry, Problem, ProblemId,
    ReminderSettings, Solution, Status, Subtask, SubtaskStatus, Template, TemplateId, TimeLog,
    Visibility,
};
use crate::permissions::{AccessLevel, Grant, PermissionResolver, PermissionsDoc};
use crate::storage::{Groups, JsonStore, Permissions, Problems, Reminders, Templates};
use crate::tags;

const MAX_EFFECTIVENESS: u8 = 10;

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(HubError::missing(field)),
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewProblem {
    pub title: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub group_id: Option<u64>,
    pub visibility: Option<Visibility>,
}

impl NewProblem {
    /// Prefill from a template; the due date still has to be supplied.
    pub fn from_template(template: &Template, due_date: Option<NaiveDate>) -> Self {
        Self {
            title: Some(template.name.clone()),
            category: Some(template.category.clone()),
            description: template.description.clone(),
            due_date,
            tags: template.tags.clone(),
            group_id: None,
            visibility: None,
        }
    }
}

/// Full replacement of the editable fields.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProblemEdit {
    pub title: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    pub status: Option<Status>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewSolution {
    pub description: Option<String>,
    /// One step per line.
    #[serde(default)]
    pub steps: String,
    #[serde(default)]
    pub effectiveness: u8,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub status: Option<Status>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl SearchQuery {
    pub fn matches(&self, problem: &Problem) -> bool {
        if let Some(q) = self.q.as_deref().map(str::to_lowercase).filter(|q| !q.is_empty()) {
            let hit = problem.matches_text(&q)
                || problem.comments.iter().any(|c| c.text.to_lowercase().contains(&q))
                || problem
                    .solutions
                    .iter()
                    .any(|s| s.description.to_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        if self.category.as_ref().is_some_and(|c| *c != problem.category) {
            return false;
        }
        if self.status.is_some_and(|s| s != problem.status) {
            return false;
        }
        if !self.tags.iter().all(|t| problem.tags.contains(t)) {
            return false;
        }
        if self.date_from.is_some_and(|from| problem.created_date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| problem.due_date > to) {
            return false;
        }
        true
    }
}

pub struct ProblemService {
    store: Arc<JsonStore>,
    permissions: PermissionResolver,
    events: EventBus,
}

impl ProblemService {
    pub fn new(store: Arc<JsonStore>, events: EventBus) -> Self {
        Self {
            permissions: PermissionResolver::new(store.clone()),
            store,
            events,
        }
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    /// Problems the caller owns or holds at least read access to.
    pub fn list_accessible(&self, ctx: &RequestContext) -> Result<Vec<Problem>> {
        let problems = self.store.load::<Problems>()?.problems;
        if ctx.is_admin {
            return Ok(problems);
        }
        let grants: PermissionsDoc = self.store.load::<Permissions>()?;
        Ok(problems
            .into_iter()
            .filter(|p| {
                p.owner_id == ctx.user_id
                    || PermissionResolver::check(&grants, &ctx.user_id, p.id, AccessLevel::Read)
            })
            .collect())
    }

    pub fn get(&self, ctx: &RequestContext, id: ProblemId) -> Result<Problem> {
        let doc = self.store.load::<Problems>()?;
        let problem = doc
            .find(id)
            .ok_or_else(|| HubError::not_found(format!("problem {id}")))?;
        self.permissions
            .authorize_problem(ctx, problem, AccessLevel::Read)?;
        Ok(problem.clone())
    }

    pub fn create(&self, ctx: &RequestContext, input: NewProblem) -> Result<Problem> {
        let title = required("title", input.title)?;
        let category = required("category", input.category)?;
        let due_date = input.due_date.ok_or_else(|| HubError::missing("due_date"))?;
        if let Some(group_id) = input.group_id {
            let groups = self.store.load::<Groups>()?;
            let group = groups
                .groups
                .iter()
                .find(|g| g.id == group_id)
                .ok_or_else(|| HubError::not_found(format!("group {group_id}")))?;
            if !group.is_member(&ctx.user_id) {
                return Err(HubError::AccessDenied);
            }
        }

        let problem = self.store.update::<Problems, _, _>(|doc| {
            let created = now();
            let problem = Problem {
                id: doc.allocate_id(),
                title,
                category,
                description: input.description,
                status: Status::Open,
                created_date: created.date(),
                due_date,
                tags: tags::normalize(input.tags),
                owner_id: ctx.user_id.clone(),
                group_id: input.group_id,
                visibility: input.visibility.unwrap_or_default(),
                history: vec![HistoryEntry::new(
                    created,
                    HistoryAction::Created,
                    "problem created",
                )],
                subtasks: Vec::new(),
                comments: Vec::new(),
                solutions: Vec::new(),
                time_logs: Vec::new(),
                total_time: 0,
            };
            doc.problems.push(problem.clone());
            Ok(problem)
        })?;
        info!(id = problem.id, owner = %ctx.user_id, "created problem");
        self.events.send(Event::ProblemCreated { id: problem.id });
        Ok(problem)
    }

    /// Load, authorize and mutate one problem under the collection lock.
    fn mutate<R>(
        &self,
        ctx: &RequestContext,
        id: ProblemId,
        required: AccessLevel,
        f: impl FnOnce(&mut Problem) -> Result<R>,
    ) -> Result<R> {
        let out = self.store.update::<Problems, _, _>(|doc| {
            let problem = doc.find_mut(id)?;
            self.permissions.authorize_problem(ctx, problem, required)?;
            f(problem)
        })?;
        self.events.send(Event::ProblemUpdated { id });
        Ok(out)
    }

    pub fn edit(&self, ctx: &RequestContext, id: ProblemId, edit: ProblemEdit) -> Result<Problem> {
        let title = required("title", edit.title)?;
        let category = required("category", edit.category)?;
        let status = edit.status.ok_or_else(|| HubError::missing("status"))?;
        let due_date = edit.due_date.ok_or_else(|| HubError::missing("due_date"))?;
        let tags = tags::normalize(edit.tags);
        let description = edit.description;

        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let at = now();
            let entry = if problem.status != status {
                HistoryEntry::status_change(at, problem.status, status)
            } else {
                let mut changed = Vec::new();
                if problem.title != title {
                    changed.push("title");
                }
                if problem.category != category {
                    changed.push("category");
                }
                if problem.description != description {
                    changed.push("description");
                }
                if problem.due_date != due_date {
                    changed.push("due_date");
                }
                if problem.tags != tags {
                    changed.push("tags");
                }
                let details = if changed.is_empty() {
                    "no fields changed".to_string()
                } else {
                    format!("updated fields: {}", changed.join(", "))
                };
                HistoryEntry::new(at, HistoryAction::Edited, details)
            };
            problem.title = title;
            problem.category = category;
            problem.description = description;
            problem.status = status;
            problem.due_date = due_date;
            problem.tags = tags;
            problem.record(entry);
            Ok(problem.clone())
        })
    }

    /// Hard removal. Requires ownership or an admin-level grant.
    pub fn delete(&self, ctx: &RequestContext, id: ProblemId) -> Result<()> {
        self.store.update::<Problems, _, _>(|doc| {
            let problem = doc.find_mut(id)?;
            self.permissions
                .authorize_problem(ctx, problem, AccessLevel::Admin)?;
            doc.problems.retain(|p| p.id != id);
            Ok(())
        })?;
        info!(id, by = %ctx.user_id, "deleted problem");
        self.events.send(Event::ProblemDeleted { id });
        Ok(())
    }

    pub fn update_status(&self, ctx: &RequestContext, id: ProblemId, status: Status) -> Result<Problem> {
        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let entry = HistoryEntry::status_change(now(), problem.status, status);
            problem.status = status;
            problem.record(entry);
            Ok(problem.clone())
        })
    }

    pub fn add_subtask(&self, ctx: &RequestContext, id: ProblemId, title: Option<String>) -> Result<Subtask> {
        let title = required("title", title)?;
        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let at = now();
            let subtask = Subtask {
                id: next_id(&problem.subtasks, |s| s.id),
                title,
                status: SubtaskStatus::Pending,
                created_date: at.date(),
                completed_date: None,
            };
            problem.record(HistoryEntry::new(
                at,
                HistoryAction::SubtaskAdded,
                format!("subtask added: {}", subtask.title),
            ));
            problem.subtasks.push(subtask.clone());
            Ok(subtask)
        })
    }

    /// Flip a subtask between pending and completed.
    pub fn toggle_subtask(&self, ctx: &RequestContext, id: ProblemId, subtask_id: u64) -> Result<Subtask> {
        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let subtask = problem
                .subtasks
                .iter_mut()
                .find(|s| s.id == subtask_id)
                .ok_or_else(|| HubError::not_found(format!("subtask {subtask_id}")))?;
            match subtask.status {
                SubtaskStatus::Pending => {
                    subtask.status = SubtaskStatus::Completed;
                    subtask.completed_date = Some(today());
                }
                SubtaskStatus::Completed => {
                    subtask.status = SubtaskStatus::Pending;
                    subtask.completed_date = None;
                }
            }
            Ok(subtask.clone())
        })
    }

    pub fn add_comment(&self, ctx: &RequestContext, id: ProblemId, text: Option<String>) -> Result<Comment> {
        let text = required("text", text)?;
        self.mutate(ctx, id, AccessLevel::Read, |problem| {
            let at = now();
            let comment = Comment {
                id: next_id(&problem.comments, |c| c.id),
                mentions: tags::extract_mentions(&text),
                text,
                created_date: at,
                user: ctx.user_id.clone(),
            };
            problem.record(HistoryEntry::new(at, HistoryAction::CommentAdded, "comment added"));
            problem.comments.push(comment.clone());
            Ok(comment)
        })
    }

    pub fn log_time(
        &self,
        ctx: &RequestContext,
        id: ProblemId,
        minutes: u32,
        description: String,
    ) -> Result<TimeLog> {
        if minutes == 0 {
            return Err(HubError::Validation("minutes must be positive".to_string()));
        }
        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let entry = TimeLog {
                id: next_id(&problem.time_logs, |t| t.id),
                minutes,
                description,
                logged_date: now(),
                user: ctx.user_id.clone(),
            };
            problem.time_logs.push(entry.clone());
            problem.recompute_total_time();
            Ok(entry)
        })
    }

    pub fn add_solution(&self, ctx: &RequestContext, id: ProblemId, input: NewSolution) -> Result<Solution> {
        let description = required("description", input.description)?;
        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let at = now();
            let solution = Solution {
                id: next_id(&problem.solutions, |s| s.id),
                description,
                steps: input
                    .steps
                    .lines()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                created_date: at,
                effectiveness: input.effectiveness.min(MAX_EFFECTIVENESS),
                implemented: false,
                implementation_date: None,
            };
            problem.record(HistoryEntry::new(at, HistoryAction::SolutionAdded, "solution added"));
            problem.solutions.push(solution.clone());
            Ok(solution)
        })
    }

    pub fn implement_solution(
        &self,
        ctx: &RequestContext,
        id: ProblemId,
        solution_id: u64,
    ) -> Result<Solution> {
        self.mutate(ctx, id, AccessLevel::Write, |problem| {
            let at = now();
            let solution = problem
                .solutions
                .iter_mut()
                .find(|s| s.id == solution_id)
                .ok_or_else(|| HubError::not_found(format!("solution {solution_id}")))?;
            solution.implemented = true;
            solution.implementation_date = Some(at);
            let solution = solution.clone();
            problem.record(HistoryEntry::new(
                at,
                HistoryAction::SolutionImplemented,
                format!("solution {solution_id} implemented"),
            ));
            Ok(solution)
        })
    }

    /// Grant another user access. The caller needs admin capability on the
    /// problem (owners have it).
    pub fn share(
        &self,
        ctx: &RequestContext,
        id: ProblemId,
        username: &str,
        level: AccessLevel,
    ) -> Result<Grant> {
        let problem = self.get(ctx, id)?;
        self.permissions
            .authorize_problem(ctx, &problem, AccessLevel::Admin)?;
        // Granted under the problems lock; a deleted problem never keeps grants.
        let grant = self.store.update::<Problems, _, _>(|doc| {
            let problem = doc.find_mut(id)?;
            let grant = self.permissions.grant(id, username, level)?;
            problem.visibility = Visibility::Shared;
            Ok(grant)
        })?;
        self.events.send(Event::ProblemShared {
            id,
            principal: username.to_string(),
            level,
        });
        Ok(grant)
    }

    pub fn sharing(&self, ctx: &RequestContext, id: ProblemId) -> Result<Vec<Grant>> {
        self.get(ctx, id)?;
        self.permissions.grants_for(id)
    }

    /// Dashboard filter; `"all"` or an empty value disables a criterion.
    pub fn filter(
        &self,
        ctx: &RequestContext,
        category: Option<&str>,
        status: Option<Status>,
        search: Option<&str>,
    ) -> Result<Vec<Problem>> {
        let category = category.filter(|c| !c.is_empty() && *c != "all");
        let search = search.map(str::to_lowercase).filter(|s| !s.is_empty());
        Ok(self
            .list_accessible(ctx)?
            .into_iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .filter(|p| status.map_or(true, |s| p.status == s))
            .filter(|p| search.as_deref().map_or(true, |s| p.matches_text(s)))
            .collect())
    }

    pub fn search(&self, ctx: &RequestContext, query: &SearchQuery) -> Result<Vec<Problem>> {
        Ok(self
            .list_accessible(ctx)?
            .into_iter()
            .filter(|p| query.matches(p))
            .collect())
    }

    pub fn tag_autocomplete(&self, ctx: &RequestContext, query: &str) -> Result<Vec<String>> {
        Ok(tags::autocomplete(&self.list_accessible(ctx)?, query))
    }

    pub fn tag_suggestions(&self, ctx: &RequestContext, text: &str) -> Result<Vec<String>> {
        Ok(tags::suggest(&self.list_accessible(ctx)?, text))
    }

    /// Freeze a problem's category, description, subtasks and tags.
    pub fn save_as_template(
        &self,
        ctx: &RequestContext,
        id: ProblemId,
        name: Option<String>,
    ) -> Result<Template> {
        let problem = self.get(ctx, id)?;
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| problem.title.clone());
        self.store.update::<Templates, _, _>(|doc| {
            let template = Template {
                id: next_id(&doc.templates, |t| t.id),
                name,
                category: problem.category,
                description: problem.description,
                subtasks: problem.subtasks,
                tags: problem.tags,
                created_date: now(),
            };
            doc.templates.push(template.clone());
            Ok(template)
        })
    }

    pub fn templates(&self) -> Result<Vec<Template>> {
        Ok(self.store.load::<Templates>()?.templates)
    }

    pub fn template(&self, id: TemplateId) -> Result<Template> {
        self.templates()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| HubError::not_found(format!("template {id}")))
    }

    /// New problem from a template; its subtasks start over as pending.
    pub fn create_from_template(
        &self,
        ctx: &RequestContext,
        template_id: TemplateId,
        due_date: Option<NaiveDate>,
    ) -> Result<Problem> {
        let template = self.template(template_id)?;
        let problem = self.create(ctx, NewProblem::from_template(&template, due_date))?;
        if template.subtasks.is_empty() {
            return Ok(problem);
        }
        self.mutate(ctx, problem.id, AccessLevel::Write, |problem| {
            let created = problem.created_date;
            problem.subtasks = template
                .subtasks
                .iter()
                .map(|s| Subtask {
                    id: s.id,
                    title: s.title.clone(),
                    status: SubtaskStatus::Pending,
                    created_date: created,
                    completed_date: None,
                })
                .collect();
            Ok(problem.clone())
        })
    }

    pub fn reminder_settings(&self) -> Result<ReminderSettings> {
        self.store.load::<Reminders>()
    }

    pub fn save_reminder_settings(&self, settings: ReminderSettings) -> Result<()> {
        self.store.save::<Reminders>(&settings)
    }
}
