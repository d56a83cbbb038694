//! Background runner that fires both sweeps once a day at a fixed UTC hour.

use chrono::{DateTime, Days, NaiveTime, Utc};
use tracing::{error, info};

use super::{
    recurrence_scheduler::RecurrenceScheduler,
    registration_generator::{RegistrationGenerator, RegistrationScope},
};

/// First instant at `hour`:00 UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        Some(today)
    } else {
        Some(
            now.date_naive()
                .checked_add_days(Days::new(1))?
                .and_time(at)
                .and_utc(),
        )
    }
}

pub struct DailySweepService {
    scheduler: RecurrenceScheduler,
    generator: RegistrationGenerator,
    sweep_hour_utc: u32,
}

impl DailySweepService {
    /// Spawn the daily sweep loop.
    pub async fn spawn(
        scheduler: RecurrenceScheduler,
        generator: RegistrationGenerator,
        sweep_hour_utc: u32,
    ) -> tokio::task::JoinHandle<()> {
        let service = Self {
            scheduler,
            generator,
            sweep_hour_utc,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(sweep_hour_utc = self.sweep_hour_utc, "Starting daily sweep service");

        loop {
            let now = Utc::now();
            let Some(next_run) = next_run_after(now, self.sweep_hour_utc) else {
                error!(
                    sweep_hour_utc = self.sweep_hour_utc,
                    "Cannot schedule daily sweep; stopping"
                );
                return;
            };
            let wait = (next_run - now).to_std().unwrap_or_default();
            info!(next_run = %next_run, "Next daily sweep scheduled");
            tokio::time::sleep(wait).await;

            self.run_once(Utc::now()).await;
        }
    }

    /// Run both sweeps for the day containing `now`. One failing does not stop the other.
    pub async fn run_once(&self, now: DateTime<Utc>) {
        let today = now.date_naive();

        match self.scheduler.sweep(today, false).await {
            Ok(report) => info!(
                created = report.created_count,
                failed = report.errors.len(),
                "Daily recurring sweep finished"
            ),
            Err(e) => error!(error = %e, "Daily recurring sweep failed"),
        }

        match self
            .generator
            .sweep(&RegistrationScope::AllActive, today, false)
            .await
        {
            Ok(report) => info!(
                created = report.created,
                skipped = report.skipped,
                failed = report.errors.len(),
                "Daily registration sweep finished"
            ),
            Err(e) => error!(error = %e, "Daily registration sweep failed"),
        }
    }
}
