//! Run and once commands - reconcile the applications

use clap::Args;
use idm_sync_core::{CompositeSink, InMemoryAuditLog, TracingSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::scheduler;
use crate::task::{PassOutcome, SyncTask};

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Seconds between the starts of two passes (default: sync.rate_secs)
    #[arg(long)]
    pub rate_secs: Option<u64>,
}

/// Arguments for the once command
#[derive(Args)]
pub struct OnceArgs {
    /// Print the audit events of the pass as JSON
    #[arg(long)]
    pub json: bool,
}

async fn build_task(config: &AppConfig) -> AppResult<(SyncTask, Arc<InMemoryAuditLog>)> {
    let audit_log = Arc::new(InMemoryAuditLog::new(config.sync.audit_capacity));
    let sink = CompositeSink::new()
        .with(audit_log.clone())
        .with(Arc::new(TracingSink));
    let task = SyncTask::new(
        Box::new(super::directory(config)?),
        super::connectors(config).await?,
        config.sync.clone(),
        Arc::new(sink),
    );
    Ok((task, audit_log))
}

/// Execute the run command
pub async fn execute(config: AppConfig, args: RunArgs) -> AppResult<()> {
    let (task, _audit_log) = build_task(&config).await?;
    let period = Duration::from_secs(args.rate_secs.unwrap_or(config.sync.rate_secs).max(1));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        applications = ?task.application_names(),
        rate_secs = period.as_secs(),
        "Starting idm-sync"
    );
    scheduler::run_every(Arc::new(task), period, scheduler::ctrl_c()).await;
    Ok(())
}

/// Execute the once command
pub async fn execute_once(config: AppConfig, args: OnceArgs) -> AppResult<()> {
    let (task, audit_log) = build_task(&config).await?;
    let outcome = task.run_pass().await;
    let events = audit_log.find(None);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        println!("Outcome:      {outcome:?}");
        println!("Audit events: {}", events.len());
        if let Some(time) = task.last_sync_time() {
            println!("Last sync:    {}", time.to_rfc3339());
        }
    }

    if outcome == PassOutcome::Completed {
        Ok(())
    } else {
        Err(AppError::PassIncomplete(format!("{outcome:?}")))
    }
}
