//! # GitLab connector
//!
//! Keeps GitLab accounts and top-level group memberships in line with the
//! directory groups named after the configured pattern, for example
//! `APP_GIT_acme_Maintainer`.

pub mod client;
pub mod config;
pub mod connector;
pub mod events;
pub mod model;
pub mod permission;

pub use client::GitLabClient;
pub use config::GitLabConfig;
pub use connector::GitLabConnector;
pub use model::{GLGroup, GLIdentity, GLProject, GLState, GLUser};
pub use permission::GLPermission;

pub const APPLICATION_ID: &str = "gitlab";

/// Directory attribute receiving the GitLab user id.
pub const USER_ID_ATTRIBUTE: &str = "GITLAB_USER_ID";
