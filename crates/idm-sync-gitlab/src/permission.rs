//! GitLab membership access levels.

use idm_sync_core::PermissionOrder;
use std::fmt;

/// Access level of a group or project member, ordered by access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GLPermission {
    No,
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
    Admin,
}

impl GLPermission {
    pub const ALL: [GLPermission; 7] = [
        GLPermission::No,
        GLPermission::Guest,
        GLPermission::Reporter,
        GLPermission::Developer,
        GLPermission::Maintainer,
        GLPermission::Owner,
        GLPermission::Admin,
    ];

    /// Numeric `access_level` used by the REST API.
    #[must_use]
    pub fn access_level(&self) -> u32 {
        match self {
            GLPermission::No => 0,
            GLPermission::Guest => 10,
            GLPermission::Reporter => 20,
            GLPermission::Developer => 30,
            GLPermission::Maintainer => 40,
            GLPermission::Owner => 50,
            GLPermission::Admin => 60,
        }
    }

    #[must_use]
    pub fn from_access_level(level: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.access_level() == level)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GLPermission::No => "NO",
            GLPermission::Guest => "GUEST",
            GLPermission::Reporter => "REPORTER",
            GLPermission::Developer => "DEVELOPER",
            GLPermission::Maintainer => "MAINTAINER",
            GLPermission::Owner => "OWNER",
            GLPermission::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for GLPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PermissionOrder for GLPermission {
    const APPLICATION: &'static str = "gitlab";

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
    }

    fn base() -> Self {
        GLPermission::Guest
    }
}
