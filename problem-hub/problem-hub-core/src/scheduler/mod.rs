//! Daily maintenance: backups of the data directory and due-date reminders.
//!
//! A poller task checks the [`Schedule`] every poll interval and queues due
//! [`Job`]s to a worker task over an mpsc channel. Jobs run to completion;
//! failures are logged and the job waits for its next day.

mod backup;
mod reminders;

pub use backup::BackupManager;
pub use reminders::{due_reminders, DueReminder, EventNotifier, Notifier, REMINDER_DAYS};

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::HubConfig;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::model::now;
use crate::storage::{JsonStore, Problems};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    Backup,
    Reminders,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Job::Backup => "backup",
            Job::Reminders => "reminders",
        })
    }
}

/// What a finished job did.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    Backup { path: PathBuf },
    Reminders { sent: usize },
}

/// A job that runs once a day at a fixed local time.
#[derive(Clone, Debug)]
pub struct DailyJob {
    pub job: Job,
    pub at: NaiveTime,
    pub next_run: NaiveDateTime,
}

/// First occurrence of `at` strictly after `now`.
fn next_occurrence(at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let candidate = now.date().and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Schedule {
    jobs: Vec<DailyJob>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backups and reminders at the configured times.
    pub fn from_config(config: &HubConfig, now: NaiveDateTime) -> Self {
        Self::new()
            .every_day_at(config.backup_time, Job::Backup, now)
            .every_day_at(config.reminder_time, Job::Reminders, now)
    }

    /// A time that has already passed today first fires tomorrow.
    pub fn every_day_at(mut self, at: NaiveTime, job: Job, now: NaiveDateTime) -> Self {
        self.jobs.push(DailyJob {
            job,
            at,
            next_run: next_occurrence(at, now),
        });
        self
    }

    pub fn jobs(&self) -> &[DailyJob] {
        &self.jobs
    }

    /// Jobs whose run time has come, each moved to its next occurrence.
    /// A job is returned at most once per call however late the poll is.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<Job> {
        let mut due = Vec::new();
        for daily in &mut self.jobs {
            if daily.next_run <= now {
                due.push(daily.job);
                daily.next_run = next_occurrence(daily.at, now);
            }
        }
        due
    }
}

/// Executes jobs against the store.
pub struct Maintenance {
    store: Arc<JsonStore>,
    backups: BackupManager,
    notifier: Arc<dyn Notifier>,
    events: EventBus,
}

impl Maintenance {
    pub fn new(
        store: Arc<JsonStore>,
        backups: BackupManager,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            backups,
            notifier,
            events,
        }
    }

    /// Backups of the store's data directory per `config`, reminders
    /// through an [`EventNotifier`].
    pub fn from_config(store: Arc<JsonStore>, config: &HubConfig, events: EventBus) -> Self {
        let backups = BackupManager::new(
            store.data_dir(),
            config.backup_dir.clone(),
            config.backup_retention,
        );
        let notifier = Arc::new(EventNotifier::new(events.clone()));
        Self::new(store, backups, notifier, events)
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub async fn run(&self, job: Job) -> Result<JobReport> {
        match job {
            Job::Backup => {
                let path = self.backups.create_backup()?;
                self.events.send(Event::BackupCreated {
                    path: path.display().to_string(),
                });
                Ok(JobReport::Backup { path })
            }
            Job::Reminders => {
                let problems = self.store.load::<Problems>()?.problems;
                let reminders = due_reminders(&problems, now().date());
                for reminder in &reminders {
                    self.notifier.notify(reminder).await?;
                }
                info!(sent = reminders.len(), "reminder scan finished");
                Ok(JobReport::Reminders {
                    sent: reminders.len(),
                })
            }
        }
    }
}

/// Poller and worker tasks of a running scheduler.
pub struct SchedulerHandle {
    jobs: mpsc::Sender<Job>,
    poller: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queue a job outside the schedule. Returns false once the worker is
    /// gone.
    pub async fn trigger(&self, job: Job) -> bool {
        self.jobs.send(job).await.is_ok()
    }

    pub fn shutdown(self) {
        self.poller.abort();
        self.worker.abort();
    }
}

/// Start the poller and the worker on the current runtime.
pub fn spawn(maintenance: Arc<Maintenance>, mut schedule: Schedule, poll: Duration) -> SchedulerHandle {
    let (tx, mut rx) = mpsc::channel::<Job>(16);

    let worker = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            debug!(%job, "running job");
            match maintenance.run(job).await {
                Ok(report) => debug!(?report, "job finished"),
                Err(e) => error!(%job, error = %e, "job failed"),
            }
        }
    });

    let queue = tx.clone();
    let poller = tokio::spawn(async move {
        let mut ticker = interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for job in schedule.due(now()) {
                info!(%job, "job due");
                if queue.send(job).await.is_err() {
                    return;
                }
            }
        }
    });

    SchedulerHandle {
        jobs: tx,
        poller,
        worker,
    }
}
