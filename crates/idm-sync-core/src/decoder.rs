//! Group-name decoding.
//!
//! A directory group's display name encodes the downstream organization unit
//! and the permission its members receive there, for example
//! `APP_GIT_acme_Maintainer`. The decoder applies one configured regular
//! expression with named captures to extract both parts.

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Raw captures of one decoded group name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedGroup {
    /// Organization unit name (group path, team name).
    pub unit: String,
    /// Permission or role name, if the pattern has a role capture.
    pub role: Option<String>,
    /// Whether the optional flag capture participated in the match.
    pub flag: bool,
}

/// What to do with a group that matches but lacks a required capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Log a warning and ignore the group.
    #[default]
    SkipAndWarn,
    /// Fail the application's pass.
    Strict,
}

impl DecodePolicy {
    #[must_use]
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            DecodePolicy::Strict
        } else {
            DecodePolicy::SkipAndWarn
        }
    }
}

/// Applies a configured pattern to directory group names.
#[derive(Debug, Clone)]
pub struct GroupNameDecoder {
    pattern: Regex,
    unit_capture: String,
    role_capture: Option<String>,
    flag_capture: Option<String>,
    policy: DecodePolicy,
}

impl GroupNameDecoder {
    /// Compile `pattern` and check that it declares the required captures.
    ///
    /// `flag_capture` is optional in the pattern itself: a pattern without it
    /// simply never sets the flag.
    pub fn new(
        pattern: &str,
        unit_capture: &str,
        role_capture: Option<&str>,
        flag_capture: Option<&str>,
    ) -> SyncResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| SyncError::Config(format!("invalid group pattern '{pattern}': {e}")))?;

        let declared: Vec<&str> = regex.capture_names().flatten().collect();
        for required in std::iter::once(unit_capture).chain(role_capture) {
            if !declared.contains(&required) {
                return Err(SyncError::Config(format!(
                    "group pattern '{pattern}' lacks the named capture '{required}'"
                )));
            }
        }

        let flag_capture = flag_capture
            .filter(|name| declared.contains(name))
            .map(str::to_string);

        Ok(Self {
            pattern: regex,
            unit_capture: unit_capture.to_string(),
            role_capture: role_capture.map(str::to_string),
            flag_capture,
            policy: DecodePolicy::default(),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Decode a group name.
    ///
    /// Returns `Ok(None)` if the name does not match at all, and
    /// `Err(GroupDecode)` if it matches but a required capture did not
    /// participate.
    pub fn try_decode(&self, name: &str) -> SyncResult<Option<DecodedGroup>> {
        let Some(captures) = self.pattern.captures(name) else {
            return Ok(None);
        };

        let missing = |capture: &str| SyncError::GroupDecode {
            group: name.to_string(),
            reason: format!("capture '{capture}' is empty"),
        };

        let unit = captures
            .name(&self.unit_capture)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing(&self.unit_capture))?;

        let role = match &self.role_capture {
            Some(role_capture) => Some(
                captures
                    .name(role_capture)
                    .map(|m| m.as_str())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| missing(role_capture))?
                    .to_string(),
            ),
            None => None,
        };

        let flag = self
            .flag_capture
            .as_ref()
            .is_some_and(|flag| captures.name(flag).is_some());

        debug!(group = name, unit, role = ?role, flag, "Decoded directory group");
        Ok(Some(DecodedGroup {
            unit: unit.to_string(),
            role,
            flag,
        }))
    }

    /// Decode a group name applying the configured [`DecodePolicy`].
    ///
    /// Non-matching names are always skipped with a warning; incomplete
    /// matches are skipped or fail depending on the policy.
    pub fn decode(&self, name: &str) -> SyncResult<Option<DecodedGroup>> {
        match self.try_decode(name) {
            Ok(Some(decoded)) => Ok(Some(decoded)),
            Ok(None) => {
                warn!(group = name, pattern = self.pattern.as_str(), "Group name does not match pattern, skipping");
                Ok(None)
            }
            Err(e) if self.policy == DecodePolicy::SkipAndWarn => {
                warn!(group = name, error = %e, "Group name could not be decoded, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
