use std::sync::Arc;
use tracing::info;

use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::events::{Event, EventBus};
use crate::model::{next_id, now, Group, GroupId, GroupsDoc};
use crate::storage::{Groups, JsonStore, Users};

impl Group {
    /// Creators count as members even when missing from `members`.
    pub fn is_member(&self, user: &str) -> bool {
        self.creator_id == user || self.members.iter().any(|m| m == user)
    }
}

fn find_mut(doc: &mut GroupsDoc, id: GroupId) -> Result<&mut Group> {
    doc.groups
        .iter_mut()
        .find(|g| g.id == id)
        .ok_or_else(|| HubError::not_found(format!("group {id}")))
}

pub struct GroupDirectory {
    store: Arc<JsonStore>,
    events: EventBus,
}

impl GroupDirectory {
    pub fn new(store: Arc<JsonStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    pub fn groups_for_user(&self, user: &str) -> Result<Vec<Group>> {
        Ok(self
            .store
            .load::<Groups>()?
            .groups
            .into_iter()
            .filter(|g| g.is_member(user))
            .collect())
    }

    pub fn get(&self, id: GroupId) -> Result<Group> {
        self.store
            .load::<Groups>()?
            .groups
            .into_iter()
            .find(|g| g.id == id)
            .ok_or_else(|| HubError::not_found(format!("group {id}")))
    }

    pub fn create(&self, ctx: &RequestContext, name: &str, description: &str) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HubError::missing("name"));
        }
        let group = self.store.update::<Groups, _, _>(|doc| {
            let group = Group {
                id: next_id(&doc.groups, |g| g.id),
                name: name.to_string(),
                description: description.to_string(),
                creator_id: ctx.user_id.clone(),
                members: vec![ctx.user_id.clone()],
                created_at: now(),
                open_problems: 0,
                solved_problems: 0,
            };
            doc.groups.push(group.clone());
            Ok(group)
        })?;
        info!(group = group.id, creator = %ctx.user_id, "created group");
        self.events.send(Event::GroupCreated { id: group.id });
        Ok(group)
    }

    /// Add a registered user. Only current members (or admins) may add.
    pub fn add_member(&self, ctx: &RequestContext, id: GroupId, username: &str) -> Result<Group> {
        if !self.store.load::<Users>()?.contains_key(username) {
            return Err(HubError::not_found(format!("user {username}")));
        }
        self.join(ctx, id, username)
    }

    /// Invitations are not delivered; the address joins the member list
    /// directly.
    pub fn invite(&self, ctx: &RequestContext, id: GroupId, email: &str) -> Result<Group> {
        let email = email.trim();
        if email.is_empty() {
            return Err(HubError::missing("email"));
        }
        let group = self.join(ctx, id, email)?;
        info!(group = id, %email, "invitation recorded, delivery not configured");
        Ok(group)
    }

    fn join(&self, ctx: &RequestContext, id: GroupId, member: &str) -> Result<Group> {
        self.store.update::<Groups, _, _>(|doc| {
            let group = find_mut(doc, id)?;
            if !ctx.is_admin && !group.is_member(&ctx.user_id) {
                return Err(HubError::AccessDenied);
            }
            if group.members.iter().any(|m| m == member) {
                return Err(HubError::Conflict(format!(
                    "{member} is already a member of group {id}"
                )));
            }
            group.members.push(member.to_string());
            Ok(group.clone())
        })
    }

    /// Only the creator may delete a group.
    pub fn delete(&self, ctx: &RequestContext, id: GroupId) -> Result<()> {
        self.store.update::<Groups, _, _>(|doc| {
            let group = find_mut(doc, id)?;
            if group.creator_id != ctx.user_id {
                return Err(HubError::AccessDenied);
            }
            doc.groups.retain(|g| g.id != id);
            Ok(())
        })?;
        info!(group = id, "deleted group");
        self.events.send(Event::GroupDeleted { id });
        Ok(())
    }
}
