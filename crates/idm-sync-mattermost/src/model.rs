//! Mattermost REST v4 resources.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::role::MMRole;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MMUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    /// Deactivation time in epoch millis, `0` while active.
    #[serde(default)]
    pub delete_at: i64,
    /// Space-separated system roles.
    #[serde(default)]
    pub roles: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub auth_service: String,
}

impl MMUser {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.delete_at == 0
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.split_whitespace().any(|r| r == "system_admin")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MMTeam {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MMTeamMember {
    pub user_id: String,
    #[serde(default)]
    pub roles: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MMChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub total_msg_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MMChannelMember {
    pub channel_id: String,
    pub user_id: String,
}

/// A team member resolved to its account.
#[derive(Debug, Clone)]
pub struct TeamMember {
    pub user: MMUser,
    pub role: MMRole,
}

/// A live team with its members, keyed by username.
#[derive(Debug, Clone)]
pub struct LiveTeam {
    pub team: MMTeam,
    pub members: BTreeMap<String, TeamMember>,
}

impl LiveTeam {
    /// Resolve `members` through `users_by_id`. Members without a known
    /// account are dropped.
    pub fn new(team: MMTeam, members: Vec<MMTeamMember>, users_by_id: &BTreeMap<String, MMUser>) -> Self {
        let members = members
            .into_iter()
            .filter_map(|m| {
                users_by_id.get(&m.user_id).map(|user| {
                    (
                        user.username.clone(),
                        TeamMember {
                            user: user.clone(),
                            role: MMRole::from_roles(&m.roles),
                        },
                    )
                })
            })
            .collect();
        Self { team, members }
    }

    #[must_use]
    pub fn has_member_id(&self, user_id: &str) -> bool {
        self.members.values().any(|m| m.user.id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str, username: &str) -> MMUser {
        serde_json::from_value(json!({ "id": id, "username": username })).unwrap()
    }

    #[test]
    fn test_user_state_and_roles() {
        let u: MMUser = serde_json::from_value(json!({
            "id": "abc",
            "username": "alice",
            "delete_at": 1_700_000_000_000_i64,
            "roles": "system_user system_admin"
        }))
        .unwrap();
        assert!(!u.is_active());
        assert!(u.is_admin());
        assert!(user("x", "bob").is_active());
        assert!(!user("x", "bob").is_admin());
    }

    #[test]
    fn test_live_team_resolves_members() {
        let users: BTreeMap<String, MMUser> = [user("u1", "alice"), user("u2", "bob")]
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        let team = MMTeam {
            id: "t1".into(),
            name: "dev".into(),
            display_name: "Dev".into(),
        };
        let members = vec![
            MMTeamMember { user_id: "u1".into(), roles: "team_user team_admin".into() },
            MMTeamMember { user_id: "u2".into(), roles: "team_user".into() },
            MMTeamMember { user_id: "gone".into(), roles: "team_user".into() },
        ];
        let live = LiveTeam::new(team, members, &users);
        assert_eq!(live.members.len(), 2);
        assert_eq!(live.members["alice"].role, MMRole::TeamAdmin);
        assert!(live.has_member_id("u2"));
        assert!(!live.has_member_id("gone"));
    }
}
