//! Keycloak as the identity directory of idm-sync.
//!
//! Logs in with the client-credentials grant of a confidential client and
//! reads groups and members of one realm through the admin REST API.

pub mod client;
pub mod config;

pub use client::KeycloakDirectory;
pub use config::KeycloakConfig;
