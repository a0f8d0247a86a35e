//! Whole-document JSON persistence.
//!
//! Every collection lives in one file under the data directory and is read
//! and rewritten in full. Callers either use `load`/`save` directly (last
//! writer wins) or `update`, which serializes writers per collection.

mod json;


pub use json::JsonStore;

use serde::{de::DeserializeOwned, Serialize};

use crate::model::{GroupsDoc, ProblemsDoc, ReminderSettings, TemplatesDoc, UsersDoc};
use crate::permissions::PermissionsDoc;

/// A named whole-document collection and the shape of its document.
pub trait Collection {
    const NAME: &'static str;
    type Document: Serialize + DeserializeOwned + Default;

    fn file_name() -> String {
        format!("{}.json", Self::NAME)
    }
}

pub struct Problems;
pub struct Users;
pub struct Permissions;
pub struct Groups;
pub struct Templates;
pub struct Reminders;

impl Collection for Problems {
    const NAME: &'static str = "problems";
    type Document = ProblemsDoc;
}

impl Collection for Users {
    const NAME: &'static str = "users";
    type Document = UsersDoc;
}

impl Collection for Permissions {
    const NAME: &'static str = "permissions";
    type Document = PermissionsDoc;
}

impl Collection for Groups {
    const NAME: &'static str = "groups";
    type Document = GroupsDoc;
}

impl Collection for Templates {
    const NAME: &'static str = "templates";
    type Document = TemplatesDoc;
}

impl Collection for Reminders {
    const NAME: &'static str = "reminder_settings";
    type Document = ReminderSettings;
}
