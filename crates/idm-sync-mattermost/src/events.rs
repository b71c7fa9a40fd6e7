//! Audit events published by the Mattermost connector.

use idm_sync_core::{AuditEvent, EventType};

use crate::model::{MMChannel, MMTeam, MMUser};
use crate::role::MMRole;
use crate::APPLICATION_ID;

fn user_event(event_type: EventType, user: &MMUser) -> AuditEvent {
    AuditEvent::new(event_type, APPLICATION_ID)
        .with("username", &user.username)
        .with("userId", &user.id)
}

fn team_event(event_type: EventType, user: &MMUser, team: &MMTeam) -> AuditEvent {
    user_event(event_type, user)
        .with("compositeType", "team")
        .with("compositeId", &team.id)
        .with("compositeName", &team.name)
}

pub fn user_created(user: &MMUser) -> AuditEvent {
    user_event(EventType::UserCreated, user)
}

pub fn user_activated(user: &MMUser) -> AuditEvent {
    user_event(EventType::UserUnblocked, user)
}

pub fn user_deactivated(user: &MMUser) -> AuditEvent {
    user_event(EventType::UserBlocked, user)
}

pub fn user_added_to_team(user: &MMUser, team: &MMTeam) -> AuditEvent {
    team_event(EventType::UserAdded, user, team).with("role", MMRole::TeamUser.as_str())
}

pub fn user_role_updated_in_team(user: &MMUser, team: &MMTeam, role: MMRole) -> AuditEvent {
    team_event(EventType::UserUpdated, user, team).with("role", role.as_str())
}

pub fn user_removed_from_team(user: &MMUser, team: &MMTeam) -> AuditEvent {
    team_event(EventType::UserRemoved, user, team)
}

pub fn user_removed_from_channel(user: &MMUser, channel: &MMChannel) -> AuditEvent {
    user_event(EventType::UserRemoved, user)
        .with("compositeType", "channel")
        .with("compositeId", &channel.id)
        .with("compositeName", &channel.name)
}

pub fn team_created(team: &MMTeam) -> AuditEvent {
    AuditEvent::new(EventType::CompositeCreated, APPLICATION_ID)
        .with("compositeType", "team")
        .with("compositeId", &team.id)
        .with("compositeName", &team.name)
}
