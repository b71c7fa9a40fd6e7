//! Mattermost team roles.

use idm_sync_core::PermissionOrder;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MMRole {
    TeamUser,
    TeamAdmin,
}

impl MMRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MMRole::TeamUser => "TEAM_USER",
            MMRole::TeamAdmin => "TEAM_ADMIN",
        }
    }

    /// Space-separated role list as sent to `PUT /teams/{id}/members/{uid}/roles`.
    /// Every team member keeps `team_user`.
    #[must_use]
    pub fn roles_value(&self) -> &'static str {
        match self {
            MMRole::TeamUser => "team_user",
            MMRole::TeamAdmin => "team_user team_admin",
        }
    }

    /// Highest team role found in a space-separated role list such as
    /// `"team_user team_admin"`.
    #[must_use]
    pub fn from_roles(roles: &str) -> Self {
        if roles
            .split_whitespace()
            .any(|r| r.eq_ignore_ascii_case("team_admin"))
        {
            MMRole::TeamAdmin
        } else {
            MMRole::TeamUser
        }
    }
}

impl fmt::Display for MMRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PermissionOrder for MMRole {
    const APPLICATION: &'static str = "mattermost";

    fn from_name(name: &str) -> Option<Self> {
        [MMRole::TeamUser, MMRole::TeamAdmin]
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(name))
    }

    fn base() -> Self {
        MMRole::TeamUser
    }
}
