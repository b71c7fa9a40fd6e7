//! GitLab REST v4 resources.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::permission::GLPermission;

/// Usernames of project and group access-token bots.
static BOT_USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(project|group)_\d+_bot\d*$").expect("BOT_USERNAME is a valid regex pattern")
});

const TEMP_EMAIL_PREFIX: &str = "temp-email-for-oauth-";
const TEMP_EMAIL_SUFFIX: &str = "@gitlab.localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GLState {
    #[default]
    Active,
    Blocked,
    Deactivated,
    /// Blocked by the LDAP sync, only LDAP can lift it.
    LdapBlocked,
    #[serde(other)]
    Other,
}

/// Link of an account to an external authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GLIdentity {
    pub provider: String,
    pub extern_uid: String,
}

/// A GitLab account as listed by `/users` or a membership listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GLUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub state: GLState,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub identities: Vec<GLIdentity>,
    /// Set on membership listings only.
    #[serde(default)]
    pub access_level: Option<u32>,
}

impl GLUser {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == GLState::Active
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.state == GLState::Blocked
    }

    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.bot || BOT_USERNAME.is_match(&self.username)
    }

    /// Account created on a first SSO login without a known email address.
    #[must_use]
    pub fn has_temporary_email(&self) -> bool {
        self.email
            .as_deref()
            .is_some_and(|e| e.starts_with(TEMP_EMAIL_PREFIX) && e.ends_with(TEMP_EMAIL_SUFFIX))
    }

    /// Username of the account a temporary account duplicates: the
    /// username without its trailing disambiguating digit. `None` when the
    /// username does not end in a digit.
    #[must_use]
    pub fn primary_username(&self) -> Option<&str> {
        self.username
            .strip_suffix(|c: char| c.is_ascii_digit())
            .filter(|base| !base.is_empty())
    }

    /// Membership permission, `None` for unknown access levels.
    #[must_use]
    pub fn permission(&self) -> Option<GLPermission> {
        self.access_level.and_then(GLPermission::from_access_level)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GLGroup {
    pub id: u64,
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<u64>,
    /// Only present when listed with `statistics=true`.
    #[serde(default)]
    pub statistics: Option<BTreeMap<String, serde_json::Value>>,
}

impl GLGroup {
    #[must_use]
    pub fn is_subgroup(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GLProject {
    pub id: u64,
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path_with_namespace: String,
}

/// A live group with its direct members, keyed by username.
#[derive(Debug, Clone)]
pub struct LiveGroup {
    pub group: GLGroup,
    pub members: BTreeMap<String, GLUser>,
}

impl LiveGroup {
    pub fn new(group: GLGroup, members: Vec<GLUser>) -> Self {
        Self {
            group,
            members: members
                .into_iter()
                .map(|m| (m.username.clone(), m))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_member(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    #[must_use]
    pub fn permission(&self, username: &str) -> Option<GLPermission> {
        self.members.get(username).and_then(GLUser::permission)
    }
}
