use cadence_core::db;
use cadence_core::error::CoreError;
use cadence_core::repository::SqliteRepository;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::new().unwrap_or_else(|e| {
        eprintln!(
            "{} failed to read configuration ({e}), using defaults",
            "Warning:".yellow().bold()
        );
        config::Config::default()
    });

    let db_pool = match db::establish_connection(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let repository = SqliteRepository::new(db_pool);

    let cli = cli::Cli::parse();

    let result = match cli.command {
        cli::Commands::Run => commands::run_worker(&repository, &config.worker_config()).await,
        cli::Commands::RunOrg { organization_id } => {
            commands::run_single_organization(&repository, organization_id).await
        }
        cli::Commands::Status { organization_id } => {
            commands::show_status(&repository, organization_id).await
        }
        cli::Commands::Stats => commands::show_stats(&repository).await,
        cli::Commands::Cleanup => commands::run_cleanup(&repository).await,
    };

    if let Err(e) = result {
        handle_error(e);
    }
}

fn handle_error(error: CoreError) {
    eprintln!(
        "{} [{}] {}",
        "Error:".red().bold(),
        error.error_code(),
        error
    );
    std::process::exit(1);
}
