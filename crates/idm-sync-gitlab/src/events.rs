//! Audit events published by the GitLab connector.

use idm_sync_core::{AuditEvent, EventType};

use crate::model::{GLGroup, GLProject, GLUser};
use crate::permission::GLPermission;
use crate::APPLICATION_ID;

fn user_event(event_type: EventType, user: &GLUser) -> AuditEvent {
    AuditEvent::new(event_type, APPLICATION_ID)
        .with("username", &user.username)
        .with("userId", user.id.to_string())
}

fn group_event(event_type: EventType, user: &GLUser, group: &GLGroup) -> AuditEvent {
    user_event(event_type, user)
        .with("compositeType", "group")
        .with("compositeId", group.id.to_string())
        .with("compositeName", &group.path)
}

pub fn user_created(user: &GLUser) -> AuditEvent {
    user_event(EventType::UserCreated, user)
}

pub fn user_blocked(user: &GLUser) -> AuditEvent {
    user_event(EventType::UserBlocked, user)
}

pub fn user_unblocked(user: &GLUser) -> AuditEvent {
    user_event(EventType::UserUnblocked, user)
}

pub fn user_deleted(user: &GLUser) -> AuditEvent {
    user_event(EventType::UserRemoved, user)
}

pub fn identity_added(user: &GLUser, extern_uid: &str) -> AuditEvent {
    user_event(EventType::UserUpdated, user).with("idpUserId", extern_uid)
}

pub fn user_added_to_group(user: &GLUser, group: &GLGroup, permission: GLPermission) -> AuditEvent {
    group_event(EventType::UserAdded, user, group).with("role", permission.as_str())
}

pub fn user_removed_from_group(user: &GLUser, group: &GLGroup) -> AuditEvent {
    group_event(EventType::UserRemoved, user, group)
}

pub fn user_removed_from_project(user: &GLUser, project: &GLProject) -> AuditEvent {
    user_event(EventType::UserRemoved, user)
        .with("compositeType", "project")
        .with("compositeId", project.id.to_string())
        .with("compositeName", &project.path_with_namespace)
}

pub fn group_created(group: &GLGroup) -> AuditEvent {
    AuditEvent::new(EventType::CompositeCreated, APPLICATION_ID)
        .with("compositeType", "group")
        .with("compositeId", group.id.to_string())
        .with("compositeName", &group.path)
}
