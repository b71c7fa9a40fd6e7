//! Binary error types and exit codes

use idm_sync_core::SyncError;
use thiserror::Error;

/// Exit codes
/// - 0: Success
/// - 1: Configuration or general error
/// - 2: Directory authentication failed
/// - 3: Remote API unavailable
/// - 4: Invalid command input
/// - 5: Reconciliation pass incomplete
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown application '{0}'. Run 'idm-sync applications' to list them.")]
    UnknownApplication(String),

    #[error("Could not authenticate against the identity directory")]
    DirectoryAuth,

    #[error("Statistics are not available for '{0}'")]
    StatisticsUnavailable(String),

    #[error("Reconciliation pass did not complete cleanly ({0})")]
    PassIncomplete(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Output error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::DirectoryAuth => 2,
            AppError::StatisticsUnavailable(_) => 3,
            AppError::UnknownApplication(_) => 4,
            AppError::PassIncomplete(_) => 5,
            AppError::Sync(e) => match e {
                SyncError::NotAuthenticated | SyncError::Auth(_) => 2,
                SyncError::Http(_)
                | SyncError::RateLimited
                | SyncError::Api { .. }
                | SyncError::Unavailable(_) => 3,
                _ => 1,
            },
            AppError::Config(_) | AppError::Json(_) => 1,
        }
    }

    /// Classify a failure to load the configuration file.
    pub fn from_config(err: anyhow::Error) -> Self {
        match err.downcast::<SyncError>() {
            Ok(SyncError::Config(message)) => AppError::Config(message),
            Ok(other) => AppError::Sync(other),
            Err(err) => AppError::Config(format!("{err:#}")),
        }
    }

    pub fn print(&self) {
        eprintln!("Error: {self}");
    }
}
