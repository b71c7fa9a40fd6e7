//! # Mattermost connector
//!
//! Keeps Mattermost accounts and team memberships in line with directory
//! groups such as `APP_MM_dev-team` (team user) and `APP_MM_dev-team_ADMIN`
//! (team admin). An optional global team receives every synced user.

pub mod client;
pub mod config;
pub mod connector;
pub mod events;
pub mod model;
pub mod role;

pub use client::MattermostClient;
pub use config::MattermostConfig;
pub use connector::MattermostConnector;
pub use model::{MMChannel, MMTeam, MMUser};
pub use role::MMRole;

pub const APPLICATION_ID: &str = "mattermost";

/// Directory attribute receiving the Mattermost user id.
pub const USER_ID_ATTRIBUTE: &str = "MATTERMOST_USER_ID";
