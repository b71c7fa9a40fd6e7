//! Read-only reports over directory groups and application statistics

use clap::{Args, ValueEnum};
use idm_sync_core::report::{self, AppApplication};
use idm_sync_core::{ApplicationConnector, DirectoryGroup, DirectorySnapshot, IdentityDirectory};
use idm_sync_keycloak::KeycloakDirectory;
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::task::load_snapshot;

/// Arguments for the organizations command
#[derive(Args)]
pub struct OrganizationsArgs {
    /// Application id (gitlab, mattermost)
    pub application: String,
    /// Only units whose name contains this text
    #[arg(long)]
    pub search: Option<String>,
}

/// Arguments for the members command
#[derive(Args)]
pub struct MembersArgs {
    pub application: String,
    /// Organization unit (group path or team name)
    pub unit: String,
}

/// Arguments for the users command
#[derive(Args)]
pub struct UsersArgs {
    pub application: String,
    /// Only users whose username contains this text
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StatisticsFormat {
    #[default]
    Json,
    Csv,
}

/// Arguments for the statistics command
#[derive(Args)]
pub struct StatisticsArgs {
    pub application: String,
    #[arg(long, value_enum, default_value_t = StatisticsFormat::Json)]
    pub format: StatisticsFormat,
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn authenticated(config: &AppConfig) -> AppResult<KeycloakDirectory> {
    let directory = super::directory(config)?;
    if !directory.authenticate().await {
        return Err(AppError::DirectoryAuth);
    }
    Ok(directory)
}

async fn snapshot(
    directory: &dyn IdentityDirectory,
    connector: &dyn ApplicationConnector,
) -> AppResult<DirectorySnapshot> {
    Ok(load_snapshot(directory, connector).await?.unwrap_or_default())
}

/// Execute the applications command
pub async fn applications(config: AppConfig) -> AppResult<()> {
    let apps: Vec<AppApplication> = super::connectors(&config)
        .await?
        .iter()
        .map(|c| AppApplication {
            id: c.id().to_string(),
            name: c.display_name().to_string(),
        })
        .collect();
    print_json(&apps)
}

/// Execute the organizations command
pub async fn organizations(config: AppConfig, args: OrganizationsArgs) -> AppResult<()> {
    let connector = super::connector(&config, &args.application).await?;
    let directory = authenticated(&config).await?;
    let groups = directory
        .get_groups(connector.group_search_filter())
        .await?;
    let orgs = report::organizations(
        &groups,
        |g: &DirectoryGroup| connector.decode_group(g),
        args.search.as_deref(),
    );
    print_json(&orgs)
}

/// Execute the members command
pub async fn members(config: AppConfig, args: MembersArgs) -> AppResult<()> {
    let connector = super::connector(&config, &args.application).await?;
    let directory = authenticated(&config).await?;
    let snapshot = snapshot(&directory, connector.as_ref()).await?;
    let members = report::members(&snapshot, |g: &DirectoryGroup| connector.decode_group(g), &args.unit);
    print_json(&members)
}

/// Execute the users command
pub async fn users(config: AppConfig, args: UsersArgs) -> AppResult<()> {
    let connector = super::connector(&config, &args.application).await?;
    let directory = authenticated(&config).await?;
    let snapshot = snapshot(&directory, connector.as_ref()).await?;
    let users = report::users(
        &snapshot,
        |g: &DirectoryGroup| connector.decode_group(g),
        args.search.as_deref(),
    );
    print_json(&users)
}

/// Execute the statistics command
pub async fn statistics(config: AppConfig, args: StatisticsArgs) -> AppResult<()> {
    let connector = super::connector(&config, &args.application).await?;
    let stats = connector
        .statistics()
        .await
        .ok_or_else(|| AppError::StatisticsUnavailable(args.application.clone()))?;

    match args.format {
        StatisticsFormat::Json => print_json(&stats),
        StatisticsFormat::Csv => {
            let separator = config.sync.csv_delimiter()?;
            report::statistics_to_csv(&stats, separator, std::io::stdout().lock())?;
            Ok(())
        }
    }
}
