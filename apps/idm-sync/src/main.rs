//! idm-sync - keeps application accounts in line with the identity directory
//!
//! Reads groups and members from Keycloak and reconciles GitLab and
//! Mattermost users, groups, teams and memberships against them, either at
//! a fixed rate (`run`) or once (`once`). The remaining subcommands are
//! read-only reports.

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;
mod logging;
mod registry;
mod scheduler;
mod task;

use config::AppConfig;
use error::{AppError, AppResult};

/// idm-sync - identity directory to application reconciliation
#[derive(Parser)]
#[command(name = "idm-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile all enabled applications at a fixed rate until Ctrl-C
    Run(commands::run::RunArgs),
    /// Run a single reconciliation pass
    Once(commands::run::OnceArgs),
    /// List the configured applications
    Applications,
    /// List organization units and the roles directory groups grant in them
    Organizations(commands::report::OrganizationsArgs),
    /// List directory users receiving a role in one organization unit
    Members(commands::report::MembersArgs),
    /// List directory users seen by an application
    Users(commands::report::UsersArgs),
    /// Show usage statistics per organization unit
    Statistics(commands::report::StatisticsArgs),
}

async fn run(cli: Cli, config: AppConfig) -> AppResult<()> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(config, args).await,
        Commands::Once(args) => commands::run::execute_once(config, args).await,
        Commands::Applications => commands::report::applications(config).await,
        Commands::Organizations(args) => commands::report::organizations(config, args).await,
        Commands::Members(args) => commands::report::members(config, args).await,
        Commands::Users(args) => commands::report::users(config, args).await,
        Commands::Statistics(args) => commands::report::statistics(config, args).await,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            let e = AppError::from_config(e);
            e.print();
            std::process::exit(e.exit_code());
        }
    };

    logging::init_logging(logging::DEFAULT_FILTER);

    if let Err(e) = run(cli, config).await {
        e.print();
        std::process::exit(e.exit_code());
    }
}
