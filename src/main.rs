use std::future::Future;

use clap::Parser;
use culler::{
    config::LoggingConfig,
    jobs::{self, JobResult, blob_cleanup, database_cleanup},
    observability,
};

/// CLI arguments for the retention jobs
#[derive(Parser, Debug)]
#[command(version, about = "Retention cleanup for blob archives and SQL audit tables", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Delete Archive-tier blobs older than RETENTION_DAYS
    Blob {
        /// Run on a cron schedule (`sec min hour day month weekday`) instead of once
        #[arg(long)]
        schedule: Option<String>,
    },
    /// Delete rows older than RETENTION_DAYS from Logs and AuditTrail
    Database {
        /// Run on a cron schedule (`sec min hour day month weekday`) instead of once
        #[arg(long)]
        schedule: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // A missing .env file is normal outside local development.
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Failed to load .env file: {}", e);
        std::process::exit(1);
    }

    let logging = match LoggingConfig::from_env() {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("Invalid logging configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = observability::init_tracing(&logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    match args.command {
        Command::Blob { schedule } => {
            run("blob_cleanup", schedule, blob_cleanup::run_from_env).await;
        }
        Command::Database { schedule } => {
            run("database_cleanup", schedule, database_cleanup::run_from_env).await;
        }
    }
}

/// Run `job` once, or repeatedly when a schedule is given.
async fn run<F, Fut, T>(name: &str, schedule: Option<String>, job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = JobResult<T>>,
{
    let Some(expression) = schedule else {
        run_once(name, job).await;
        return;
    };

    let schedule = match jobs::parse_schedule(&expression) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!(job = name, error = %e, "Invalid schedule");
            std::process::exit(1);
        }
    };

    jobs::run_on_schedule(name, &schedule, shutdown_signal(), job).await;
}

async fn run_once<F, Fut, T>(name: &str, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = JobResult<T>>,
{
    if let Err(e) = job().await {
        tracing::error!(job = name, error = %e, "Job failed");
        std::process::exit(1);
    }
}

/// Completes on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping after the current run");
}
