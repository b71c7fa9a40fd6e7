//! Read-only reports over the directory as seen by one application.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::connector::{AppStatistics, GroupRole};
use crate::error::SyncResult;
use crate::model::{DirectoryGroup, DirectorySnapshot};

/// A configured application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppApplication {
    pub id: String,
    pub name: String,
}

/// An organization unit with the roles granted by directory groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppOrganization {
    pub name: String,
    pub roles: BTreeSet<String>,
}

/// A directory user with the units and roles it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppUser {
    pub username: String,
    pub name: String,
    pub organizations: Vec<AppOrganization>,
}

fn collect_orgs(orgs: BTreeMap<String, BTreeSet<String>>) -> Vec<AppOrganization> {
    orgs.into_iter()
        .map(|(name, roles)| AppOrganization { name, roles })
        .collect()
}

/// Units decoded from `groups`, optionally filtered by a name substring.
pub fn organizations<F>(groups: &[DirectoryGroup], decode: F, search: Option<&str>) -> Vec<AppOrganization>
where
    F: Fn(&DirectoryGroup) -> Option<GroupRole>,
{
    let mut orgs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for role in groups.iter().filter_map(&decode) {
        if search.map_or(true, |s| role.unit.contains(s)) {
            orgs.entry(role.unit).or_default().insert(role.role);
        }
    }
    collect_orgs(orgs)
}

fn users_where<F, P>(snapshot: &DirectorySnapshot, decode: F, keep: P) -> Vec<AppUser>
where
    F: Fn(&DirectoryGroup) -> Option<GroupRole>,
    P: Fn(&GroupRole, &str) -> bool,
{
    let mut users: BTreeMap<String, (String, BTreeMap<String, BTreeSet<String>>)> = BTreeMap::new();
    for group in snapshot.groups() {
        let Some(role) = decode(group) else {
            continue;
        };
        for member in snapshot.members_of(group) {
            if !keep(&role, &member.username) {
                continue;
            }
            let (_, orgs) = users
                .entry(member.username.clone())
                .or_insert_with(|| (member.name(), BTreeMap::new()));
            orgs.entry(role.unit.clone())
                .or_default()
                .insert(role.role.clone());
        }
    }
    users
        .into_iter()
        .map(|(username, (name, orgs))| AppUser {
            username,
            name,
            organizations: collect_orgs(orgs),
        })
        .collect()
}

/// Directory users that receive a role in `unit`.
///
/// Only memberships in `unit` are listed for each user.
pub fn members<F>(snapshot: &DirectorySnapshot, decode: F, unit: &str) -> Vec<AppUser>
where
    F: Fn(&DirectoryGroup) -> Option<GroupRole>,
{
    users_where(snapshot, decode, |role, _| role.unit == unit)
}

/// All directory users seen by the application, optionally filtered by a
/// username substring.
pub fn users<F>(snapshot: &DirectorySnapshot, decode: F, search: Option<&str>) -> Vec<AppUser>
where
    F: Fn(&DirectoryGroup) -> Option<GroupRole>,
{
    users_where(snapshot, decode, |_, username| {
        search.map_or(true, |s| username.contains(s))
    })
}

/// Write statistics as CSV: `organizationName` followed by every statistic
/// key of any row in sorted order. Missing values are empty cells.
pub fn statistics_to_csv<W: Write>(stats: &[AppStatistics], separator: u8, writer: W) -> SyncResult<()> {
    let keys: BTreeSet<&str> = stats
        .iter()
        .flat_map(|s| s.statistics.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(separator)
        .from_writer(writer);

    wtr.write_record(std::iter::once("organizationName").chain(keys.iter().copied()))?;
    for row in stats {
        let cells = keys
            .iter()
            .map(|key| row.statistics.get(*key).map_or("", String::as_str));
        wtr.write_record(std::iter::once(row.organization_name.as_str()).chain(cells))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
