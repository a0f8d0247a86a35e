use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::model::{Problem, ProblemId};

/// Days before the due date on which a reminder goes out.
pub const REMINDER_DAYS: [i64; 3] = [7, 3, 1];

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DueReminder {
    pub problem_id: ProblemId,
    pub title: String,
    pub owner_id: String,
    pub due_date: NaiveDate,
    pub days_until_due: i64,
}

/// Open problems whose due date is exactly one of [`REMINDER_DAYS`] away.
pub fn due_reminders(problems: &[Problem], today: NaiveDate) -> Vec<DueReminder> {
    problems
        .iter()
        .filter(|p| !p.is_closed())
        .filter_map(|p| {
            let days = p.days_until_due(today);
            REMINDER_DAYS.contains(&days).then(|| DueReminder {
                problem_id: p.id,
                title: p.title.clone(),
                owner_id: p.owner_id.clone(),
                due_date: p.due_date,
                days_until_due: days,
            })
        })
        .collect()
}

/// Delivery channel for due-date reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, reminder: &DueReminder) -> Result<()>;
}

/// Logs the reminder and publishes it on the event bus. No mail is sent.
pub struct EventNotifier {
    events: EventBus,
}

impl EventNotifier {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Notifier for EventNotifier {
    async fn notify(&self, reminder: &DueReminder) -> Result<()> {
        info!(
            problem = reminder.problem_id,
            owner = %reminder.owner_id,
            days = reminder.days_until_due,
            "sending reminder for problem: {}",
            reminder.title
        );
        self.events.send(Event::DueReminder {
            id: reminder.problem_id,
            title: reminder.title.clone(),
            days_until_due: reminder.days_until_due,
        });
        Ok(())
    }
}
