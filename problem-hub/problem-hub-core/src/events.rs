use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{GroupId, ProblemId};
use crate::permissions::AccessLevel;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    ProblemCreated { id: ProblemId },
    ProblemUpdated { id: ProblemId },
    ProblemDeleted { id: ProblemId },
    ProblemShared { id: ProblemId, principal: String, level: AccessLevel },
    GroupCreated { id: GroupId },
    GroupDeleted { id: GroupId },
    DueReminder { id: ProblemId, title: String, days_until_due: i64 },
    BackupCreated { path: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
