//! Read-only projections over a set of problems: dashboard stats, boards,
//! calendars, reports and notifications.
//!
//! Everything here is a pure function of the problems passed in and the
//! reference date, so callers decide which problems a user may see.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{HubError, Result};
use crate::model::{timestamp, HistoryAction, Problem, ProblemId, Status, SubtaskStatus};

/// Days ahead of the due date at which a problem shows up in reminders and
/// due-date notifications.
pub const DUE_SOON_DAYS: i64 = 7;
const HIGH_PRIORITY_DAYS: i64 = 3;
const INACTIVE_DAYS: i64 = 7;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub by_status: BTreeMap<Status, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub overdue: usize,
    pub total_time_spent: u64,
    pub avg_time_per_problem: f64,
}

pub fn stats(problems: &[Problem], today: NaiveDate) -> Stats {
    let mut by_status = BTreeMap::new();
    let mut by_category = BTreeMap::new();
    for problem in problems {
        *by_status.entry(problem.status).or_insert(0) += 1;
        *by_category.entry(problem.category.clone()).or_insert(0) += 1;
    }
    let total_time_spent: u64 = problems.iter().map(|p| p.total_time).sum();
    let total = problems.len();
    Stats {
        total,
        by_status,
        by_category,
        overdue: problems.iter().filter(|p| p.is_overdue(today)).count(),
        total_time_spent,
        avg_time_per_problem: if total == 0 {
            0.0
        } else {
            total_time_spent as f64 / total as f64
        },
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Kanban {
    pub open: Vec<Problem>,
    pub in_progress: Vec<Problem>,
    pub review: Vec<Problem>,
    pub closed: Vec<Problem>,
}

pub fn kanban(problems: &[Problem]) -> Kanban {
    let mut board = Kanban::default();
    for problem in problems {
        let column = match problem.status {
            Status::Open => &mut board.open,
            Status::InProgress => &mut board.in_progress,
            Status::Review => &mut board.review,
            Status::Closed => &mut board.closed,
        };
        column.push(problem.clone());
    }
    board
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TimelineItem {
    pub id: ProblemId,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: Status,
    pub category: String,
}

impl TimelineItem {
    fn of(problem: &Problem) -> Self {
        Self {
            id: problem.id,
            title: problem.title.clone(),
            start_date: problem.created_date,
            end_date: problem.due_date,
            status: problem.status,
            category: problem.category.clone(),
        }
    }
}

pub fn timeline(problems: &[Problem]) -> Vec<TimelineItem> {
    problems.iter().map(TimelineItem::of).collect()
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GanttBar {
    #[serde(flatten)]
    pub item: TimelineItem,
    pub subtasks_total: usize,
    pub subtasks_completed: usize,
    /// Completed share of subtasks, 0..=100; closed problems without
    /// subtasks count as done.
    pub progress: f64,
}

pub fn gantt(problems: &[Problem]) -> Vec<GanttBar> {
    problems
        .iter()
        .map(|problem| {
            let total = problem.subtasks.len();
            let completed = problem
                .subtasks
                .iter()
                .filter(|s| s.status == SubtaskStatus::Completed)
                .count();
            let progress = if total == 0 {
                if problem.is_closed() {
                    100.0
                } else {
                    0.0
                }
            } else {
                percent(completed, total)
            };
            GanttBar {
                item: TimelineItem::of(problem),
                subtasks_total: total,
                subtasks_completed: completed,
                progress,
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    /// Monday-first weeks; 0 marks days outside the month.
    pub weeks: Vec<[u32; 7]>,
    /// Problems keyed by the day of the month they are due.
    pub problems_by_day: BTreeMap<u32, Vec<Problem>>,
}

pub fn calendar(problems: &[Problem], year: i32, month: u32) -> Result<CalendarMonth> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| HubError::Validation(format!("invalid month {year}-{month}")))?;
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| HubError::Validation(format!("invalid month {year}-{month}")))?;
    let days = (next - first).num_days() as u32;

    let mut weeks = Vec::new();
    let mut week = [0u32; 7];
    let mut slot = first.weekday().num_days_from_monday() as usize;
    for day in 1..=days {
        week[slot] = day;
        slot += 1;
        if slot == 7 {
            weeks.push(week);
            week = [0; 7];
            slot = 0;
        }
    }
    if slot > 0 {
        weeks.push(week);
    }

    let mut problems_by_day: BTreeMap<u32, Vec<Problem>> = BTreeMap::new();
    for problem in problems {
        let due = problem.due_date;
        if due.year() == year && due.month() == month {
            problems_by_day.entry(due.day()).or_default().push(problem.clone());
        }
    }

    Ok(CalendarMonth {
        year,
        month,
        month_name: MONTH_NAMES[month as usize - 1],
        weeks,
        problems_by_day,
    })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Reports {
    pub total_problems: usize,
    pub avg_resolution_time: f64,
    pub overdue_percentage: f64,
    pub completion_rate: f64,
    pub category_distribution: BTreeMap<String, usize>,
    pub monthly_trends: BTreeMap<String, usize>,
    pub tag_usage: BTreeMap<String, usize>,
    /// Effectiveness of the last implemented solution per problem.
    pub solution_effectiveness: BTreeMap<ProblemId, u8>,
}

pub fn reports(problems: &[Problem], today: NaiveDate) -> Reports {
    let resolution: Vec<i64> = problems.iter().filter_map(Problem::resolution_days).collect();
    let closed = problems.iter().filter(|p| p.is_closed()).count();
    let overdue = problems.iter().filter(|p| p.is_overdue(today)).count();

    let mut category_distribution = BTreeMap::new();
    let mut monthly_trends = BTreeMap::new();
    let mut tag_usage = BTreeMap::new();
    let mut solution_effectiveness = BTreeMap::new();
    for problem in problems {
        *category_distribution.entry(problem.category.clone()).or_insert(0) += 1;
        *monthly_trends.entry(month_key(problem.created_date)).or_insert(0) += 1;
        for tag in &problem.tags {
            *tag_usage.entry(tag.clone()).or_insert(0) += 1;
        }
        for solution in problem.solutions.iter().filter(|s| s.implemented) {
            solution_effectiveness.insert(problem.id, solution.effectiveness);
        }
    }

    Reports {
        total_problems: problems.len(),
        avg_resolution_time: if resolution.is_empty() {
            0.0
        } else {
            resolution.iter().sum::<i64>() as f64 / resolution.len() as f64
        },
        overdue_percentage: percent(overdue, problems.len()),
        completion_rate: percent(closed, problems.len()),
        category_distribution,
        monthly_trends,
        tag_usage,
        solution_effectiveness,
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ResolutionTime {
    pub problem_id: ProblemId,
    pub problem: String,
    pub days: i64,
    pub category: String,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct CategorySuccess {
    pub total: usize,
    pub solved: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Complexity {
    pub problem_id: ProblemId,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AdvancedReports {
    pub resolution_times: Vec<ResolutionTime>,
    pub category_success_rates: BTreeMap<String, CategorySuccess>,
    /// `"a-b"` (with `a < b`) to the number of problems carrying both tags.
    pub tag_correlations: BTreeMap<String, usize>,
    pub monthly_workload: BTreeMap<String, usize>,
    pub problem_complexity: Vec<Complexity>,
}

/// Two points per subtask, one per comment, half a point per time log.
pub fn complexity_score(problem: &Problem) -> f64 {
    problem.subtasks.len() as f64 * 2.0
        + problem.comments.len() as f64
        + problem.time_logs.len() as f64 * 0.5
}

pub fn advanced_reports(problems: &[Problem]) -> AdvancedReports {
    let mut report = AdvancedReports {
        resolution_times: Vec::new(),
        category_success_rates: BTreeMap::new(),
        tag_correlations: BTreeMap::new(),
        monthly_workload: BTreeMap::new(),
        problem_complexity: Vec::new(),
    };

    for problem in problems {
        if let Some(days) = problem.resolution_days() {
            report.resolution_times.push(ResolutionTime {
                problem_id: problem.id,
                problem: problem.title.clone(),
                days,
                category: problem.category.clone(),
            });
        }

        let success = report
            .category_success_rates
            .entry(problem.category.clone())
            .or_default();
        success.total += 1;
        if problem.is_closed() {
            success.solved += 1;
        }

        for a in &problem.tags {
            for b in problem.tags.iter().filter(|b| a < *b) {
                *report.tag_correlations.entry(format!("{a}-{b}")).or_insert(0) += 1;
            }
        }

        *report
            .monthly_workload
            .entry(month_key(problem.created_date))
            .or_insert(0) += 1;

        report.problem_complexity.push(Complexity {
            problem_id: problem.id,
            title: problem.title.clone(),
            score: complexity_score(problem),
        });
    }
    report
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DueDate,
    Inactive,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub problem_id: ProblemId,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    #[serde(with = "timestamp")]
    pub date: NaiveDateTime,
}

fn due_priority(days_left: i64) -> Priority {
    if days_left <= HIGH_PRIORITY_DAYS {
        Priority::High
    } else {
        Priority::Medium
    }
}

/// Due-soon and inactivity notices, most urgent first.
///
/// Overdue problems keep showing up with a negative day count. Problems in
/// review are not flagged as inactive.
pub fn notifications(problems: &[Problem], now: NaiveDateTime) -> Vec<Notification> {
    let today = now.date();
    let mut out = Vec::new();

    for problem in problems.iter().filter(|p| !p.is_closed()) {
        let days_left = problem.days_until_due(today);
        if days_left <= DUE_SOON_DAYS {
            out.push(Notification {
                kind: NotificationKind::DueDate,
                problem_id: problem.id,
                title: problem.title.clone(),
                message: format!("{days_left} days left to resolve this problem"),
                priority: due_priority(days_left),
                date: now,
            });
        }
    }

    for problem in problems
        .iter()
        .filter(|p| !matches!(p.status, Status::Closed | Status::Review))
    {
        let idle = (today - problem.last_activity()).num_days();
        if idle >= INACTIVE_DAYS {
            out.push(Notification {
                kind: NotificationKind::Inactive,
                problem_id: problem.id,
                title: problem.title.clone(),
                message: format!("no activity on this problem for {idle} days"),
                priority: Priority::Medium,
                date: now,
            });
        }
    }

    out.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.date.cmp(&b.date)));
    out
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Reminder {
    pub problem_id: ProblemId,
    pub title: String,
    pub due_date: NaiveDate,
    pub days_left: i64,
    pub category: String,
    pub priority: Priority,
}

/// Open problems due within a week, overdue ones included.
pub fn reminders(problems: &[Problem], today: NaiveDate) -> Vec<Reminder> {
    problems
        .iter()
        .filter(|p| !p.is_closed())
        .filter_map(|problem| {
            let days_left = problem.days_until_due(today);
            (days_left <= DUE_SOON_DAYS).then(|| Reminder {
                problem_id: problem.id,
                title: problem.title.clone(),
                due_date: problem.due_date,
                days_left,
                category: problem.category.clone(),
                priority: due_priority(days_left),
            })
        })
        .collect()
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Activity {
    pub problem_id: ProblemId,
    pub problem_title: String,
    #[serde(with = "timestamp")]
    pub date: NaiveDateTime,
    pub action: HistoryAction,
    pub details: String,
}

/// Every history entry across the problems, newest first.
pub fn activity_log(problems: &[Problem]) -> Vec<Activity> {
    let mut log: Vec<Activity> = problems
        .iter()
        .flat_map(|problem| {
            problem.history.iter().map(|entry| Activity {
                problem_id: problem.id,
                problem_title: problem.title.clone(),
                date: entry.date,
                action: entry.action,
                details: entry.details.clone(),
            })
        })
        .collect();
    log.sort_by(|a, b| b.date.cmp(&a.date));
    log
}
