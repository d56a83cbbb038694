//! `homekeep`: runs and inspects the maintenance task sweeps.

use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use db::{DBService, models::task::Task};
use serde::Serialize;
use services::services::{
    component_registration::{BackfillFilter, ComponentRegistrationService},
    config::Config,
    daily_sweep::DailySweepService,
    database_validator::DatabaseValidator,
    notification::NotificationService,
    recurrence_scheduler::RecurrenceScheduler,
    registration_generator::{RegistrationGenerator, RegistrationScope},
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "homekeep", version, about = "Recurring home maintenance task engine")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, env = "HOMEKEEP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily sweeps until interrupted.
    Run,

    /// Generate due instances of recurring tasks.
    Recurring {
        #[arg(long)]
        dry_run: bool,
        /// Treat this date (YYYY-MM-DD) as today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Generate due tasks from component registrations.
    Registrations {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Match existing components against the template catalog and register them.
    Backfill {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        owner_id: Option<Uuid>,
        #[arg(long)]
        home_id: Option<Uuid>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Recurring task counts for one owner.
    Stats {
        #[arg(long)]
        owner_id: Uuid,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    utils::logging::init(
        config
            .log_filter
            .as_deref()
            .unwrap_or(utils::logging::DEFAULT_FILTER),
    );
    match &config.source {
        Some(path) => info!(path = %path.display(), "Loaded config file"),
        None => info!("No config file found, using defaults"),
    }

    let db = DBService::new(&config.database_url)
        .await
        .with_context(|| format!("failed to open database at {}", config.database_url))?;

    let validation = DatabaseValidator::new(db.pool.clone()).validate().await?;
    if !validation.is_ok() {
        bail!(validation.summary());
    }
    info!("{}", validation.summary());

    match cli.command {
        Command::Run => run(db, &config).await,
        Command::Recurring { dry_run, date } => {
            let notifications = NotificationService::from_config(&config.notifications)?;
            let report = RecurrenceScheduler::new(db, notifications.clone())
                .sweep(today_or(date), dry_run)
                .await?;
            notifications.drain(NotificationService::DRAIN_TIMEOUT).await;
            print_json(&report)
        }
        Command::Registrations { dry_run, date } => {
            let report = RegistrationGenerator::new(db)
                .sweep(&RegistrationScope::AllActive, today_or(date), dry_run)
                .await?;
            print_json(&report)
        }
        Command::Backfill {
            dry_run,
            owner_id,
            home_id,
            date,
        } => {
            let report = ComponentRegistrationService::new(db)
                .backfill(BackfillFilter { owner_id, home_id }, today_or(date), dry_run)
                .await?;
            print_json(&report)
        }
        Command::Stats { owner_id, date } => {
            let stats = Task::recurring_stats(&db.pool, owner_id, today_or(date)).await?;
            print_json(&stats)
        }
    }
}

async fn run(db: DBService, config: &Config) -> anyhow::Result<()> {
    let notifications = NotificationService::from_config(&config.notifications)?;
    let handle = DailySweepService::spawn(
        RecurrenceScheduler::new(db.clone(), notifications.clone()),
        RegistrationGenerator::new(db),
        config.sweep_hour_utc,
    )
    .await;
    let abort = handle.abort_handle();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down");
            abort.abort();
        }
        result = handle => {
            warn!("Daily sweep service exited");
            result?;
        }
    }
    notifications.drain(NotificationService::DRAIN_TIMEOUT).await;
    Ok(())
}

fn today_or(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Utc::now().date_naive())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
