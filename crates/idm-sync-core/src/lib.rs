//! # idm-sync core
//!
//! Reconciliation building blocks shared by the identity directory client and
//! the application connectors:
//!
//! - [`model`] - directory users and groups of one pass
//! - [`decoder`] - group-name decoding into unit and permission
//! - [`target`] - desired per-unit membership with max-permission tie-break
//! - [`http`] - paginated REST client with rate-limit retry
//! - [`audit`] - audit events and sinks
//! - [`connector`] - the connector and directory traits
//! - [`report`] - read-only organization, user and statistics reports

pub mod audit;
pub mod config;
pub mod connector;
pub mod decoder;
pub mod error;
pub mod http;
pub mod link_header;
pub mod model;
pub mod permission;
pub mod report;
pub mod retry;
pub mod target;

pub use audit::{
    AuditEvent, CompositeSink, EventSink, EventType, InMemoryAuditLog, RecordingSink, TracingSink,
    PRINCIPAL,
};
pub use config::{deserialize_secret, parse_excluded_users, ClientConfig, ProxyConfig, SsoProvider};
pub use connector::{AppStatistics, ApplicationConnector, GroupRole, IdentityDirectory};
pub use decoder::{DecodePolicy, DecodedGroup, GroupNameDecoder};
pub use error::{SyncError, SyncResult};
pub use http::{AuthScheme, OffsetStyle, RestClient};
pub use link_header::{Link, LinkHeader, Rel};
pub use model::{AttributeUpdate, DirectoryGroup, DirectorySnapshot, DirectoryUser, OrganizationRole};
pub use permission::{resolve, PermissionOrder};
pub use retry::RateLimitRetry;
pub use target::{DesiredMember, DesiredUnit, DesiredUser, TargetState, TargetStateBuilder};
