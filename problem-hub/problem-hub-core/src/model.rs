//! Records stored in the JSON collections.
//!
//! Field names and date layouts follow the on-disk documents: dates are
//! `YYYY-MM-DD`, timestamps are `YYYY-MM-DD HH:MM:SS`.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HubError;

pub type ProblemId = u64;
pub type GroupId = u64;
pub type TemplateId = u64;

/// Current local time, truncated to whole seconds so it survives a round trip
/// through the timestamp format.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::FORMAT;
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<NaiveDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.collect_str(&ts.format(FORMAT)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| {
                    NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}

/// Next free id for a list whose ids are unique within that list.
pub fn next_id<T>(items: &[T], id: impl Fn(&T) -> u64) -> u64 {
    items.iter().map(id).max().unwrap_or(0) + 1
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    InProgress,
    Review,
    Closed,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Open, Status::InProgress, Status::Review, Status::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::Review => "review",
            Status::Closed => "closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| HubError::Validation(format!("unknown status `{s}`")))
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Edited,
    StatusChanged,
    SubtaskAdded,
    CommentAdded,
    SolutionAdded,
    SolutionImplemented,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    #[serde(with = "timestamp")]
    pub date: NaiveDateTime,
    pub action: HistoryAction,
    pub details: String,
}

impl HistoryEntry {
    pub fn new(date: NaiveDateTime, action: HistoryAction, details: impl Into<String>) -> Self {
        Self {
            date,
            action,
            details: details.into(),
        }
    }

    pub fn status_change(date: NaiveDateTime, from: Status, to: Status) -> Self {
        Self::new(
            date,
            HistoryAction::StatusChanged,
            format!("status changed from {from} to {to}"),
        )
    }

    /// Whether this entry records a transition into `closed`.
    pub fn closes(&self) -> bool {
        self.action == HistoryAction::StatusChanged
            && self
                .details
                .rsplit(" to ")
                .next()
                .is_some_and(|to| to == Status::Closed.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: u64,
    pub title: String,
    pub status: SubtaskStatus,
    pub created_date: NaiveDate,
    #[serde(default)]
    pub completed_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub text: String,
    #[serde(with = "timestamp")]
    pub created_date: NaiveDateTime,
    pub user: String,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    pub id: u64,
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(with = "timestamp")]
    pub created_date: NaiveDateTime,
    #[serde(default)]
    pub effectiveness: u8,
    #[serde(default)]
    pub implemented: bool,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub implementation_date: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimeLog {
    pub id: u64,
    pub minutes: u32,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub logged_date: NaiveDateTime,
    pub user: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub id: ProblemId,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    pub created_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub tags: Vec<String>,
    pub owner_id: String,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub time_logs: Vec<TimeLog>,
    /// Minutes logged across `time_logs`.
    #[serde(default)]
    pub total_time: u64,
}

impl Problem {
    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }

    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today && !self.is_closed()
    }

    /// Date of the most recent history entry, or the creation date for a
    /// problem without history.
    pub fn last_activity(&self) -> NaiveDate {
        self.history
            .iter()
            .map(|entry| entry.date.date())
            .max()
            .unwrap_or(self.created_date)
    }

    /// Days from creation to the last transition into `closed`.
    pub fn resolution_days(&self) -> Option<i64> {
        if !self.is_closed() {
            return None;
        }
        self.history
            .iter()
            .rev()
            .find(|entry| entry.closes())
            .map(|entry| (entry.date.date() - self.created_date).num_days())
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn recompute_total_time(&mut self) {
        self.total_time = self.time_logs.iter().map(|log| u64::from(log.minutes)).sum();
    }

    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProblemsDoc {
    pub problems: Vec<Problem>,
    /// Highest id ever handed out, so ids of deleted problems are not reused.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_id: ProblemId,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl ProblemsDoc {
    pub fn find(&self, id: ProblemId) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn find_mut(&mut self, id: ProblemId) -> crate::Result<&mut Problem> {
        self.problems
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| HubError::not_found(format!("problem {id}")))
    }

    pub fn allocate_id(&mut self) -> ProblemId {
        let id = next_id(&self.problems, |p| p.id).max(self.last_id + 1);
        self.last_id = id;
        id
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Account record; the username is the key of the users document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(default, with = "timestamp::option")]
    pub last_login: Option<NaiveDateTime>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub type UsersDoc = std::collections::BTreeMap<String, User>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub creator_id: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    /// Never refreshed after creation.
    #[serde(default)]
    pub open_problems: u32,
    #[serde(default)]
    pub solved_problems: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupsDoc {
    pub groups: Vec<Group>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "timestamp")]
    pub created_date: NaiveDateTime,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplatesDoc {
    pub templates: Vec<Template>,
}

/// Stored and returned as-is; the reminder scan uses its own fixed days.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReminderSettings {
    #[serde(default)]
    pub days_before: Vec<String>,
    #[serde(default)]
    pub notification_types: Vec<String>,
}
