//! Sharing table and access checks.
//!
//! Grants are stored per resource id. A check passes for admins, otherwise
//! the first grant for the user on that resource decides; later duplicates
//! are never consulted, even when they carry a higher level.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::model::{now, timestamp, Problem, ProblemId};
use crate::storage::{JsonStore, Permissions, Users};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read = 1,
    Write = 2,
    Admin = 3,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::Read, AccessLevel::Write, AccessLevel::Admin];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        }
    }

    /// Whether holding `self` is enough for an action requiring `required`.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self.level() >= required.level()
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        AccessLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| HubError::UnknownAccessLevel(s.to_string()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Grant {
    pub user_id: String,
    pub resource_id: ProblemId,
    pub permission_type: AccessLevel,
    #[serde(with = "timestamp")]
    pub granted_at: NaiveDateTime,
}

/// Resource id (as a string key) to its grants, in insertion order.
pub type PermissionsDoc = BTreeMap<String, Vec<Grant>>;

/// Decide a check against one resource's grant list.
pub fn resolve(grants: &[Grant], user: &str, required: AccessLevel) -> bool {
    grants
        .iter()
        .find(|grant| grant.user_id == user)
        .is_some_and(|grant| grant.permission_type.satisfies(required))
}

#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<JsonStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    /// Check whether the caller may perform `required` on `resource_id`.
    /// Resources without grants simply deny.
    pub fn has_permission(
        &self,
        ctx: &RequestContext,
        resource_id: ProblemId,
        required: AccessLevel,
    ) -> Result<bool> {
        if ctx.is_admin {
            return Ok(true);
        }
        let doc = self.store.load::<Permissions>()?;
        Ok(Self::check(&doc, &ctx.user_id, resource_id, required))
    }

    /// Same as [`has_permission`](Self::has_permission) against an already
    /// loaded document, for filtering many resources at once.
    pub fn check(
        doc: &PermissionsDoc,
        user: &str,
        resource_id: ProblemId,
        required: AccessLevel,
    ) -> bool {
        doc.get(&resource_id.to_string())
            .is_some_and(|grants| resolve(grants, user, required))
    }

    /// Owners pass outright; everyone else goes through the sharing table.
    pub fn authorize_problem(
        &self,
        ctx: &RequestContext,
        problem: &Problem,
        required: AccessLevel,
    ) -> Result<()> {
        if problem.owner_id == ctx.user_id || self.has_permission(ctx, problem.id, required)? {
            Ok(())
        } else {
            Err(HubError::AccessDenied)
        }
    }

    /// Append a grant for an existing user. Duplicate grants accumulate.
    pub fn grant(&self, resource_id: ProblemId, user: &str, level: AccessLevel) -> Result<Grant> {
        if !self.store.load::<Users>()?.contains_key(user) {
            return Err(HubError::not_found(format!("user {user}")));
        }
        let grant = Grant {
            user_id: user.to_string(),
            resource_id,
            permission_type: level,
            granted_at: now(),
        };
        self.store.update::<Permissions, _, _>(|doc| {
            doc.entry(resource_id.to_string())
                .or_default()
                .push(grant.clone());
            Ok(())
        })?;
        tracing::info!(resource_id, user, %level, "granted access");
        Ok(grant)
    }

    pub fn grants_for(&self, resource_id: ProblemId) -> Result<Vec<Grant>> {
        Ok(self
            .store
            .load::<Permissions>()?
            .remove(&resource_id.to_string())
            .unwrap_or_default())
    }
}
