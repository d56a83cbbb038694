//! Generates maintenance tasks from component registrations on their cadence.

use chrono::{Days, NaiveDate};
use db::{
    DBService,
    models::{
        home_component::HomeComponent,
        task::{CreateTask, Task, TaskPriority, TaskStatus},
        task_registration::TaskRegistration,
        task_template::TaskTemplate,
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Months are approximated as 30 days when deciding whether a registration is due.
pub const APPROX_DAYS_PER_MONTH: i64 = 30;
/// Generated tasks are due this many days after the sweep that creates them.
pub const DUE_DATE_BUFFER_DAYS: u64 = 7;

#[derive(Debug, Error)]
pub enum RegistrationGeneratorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task template {0} not found")]
    TemplateNotFound(Uuid),
    #[error("home component {0} not found")]
    ComponentNotFound(Uuid),
    #[error("date arithmetic out of range")]
    DateOutOfRange,
}

/// Which registrations a sweep looks at.
#[derive(Debug, Clone, Default)]
pub enum RegistrationScope {
    #[default]
    AllActive,
    /// Only these registrations, and only if they are active.
    Only(Vec<Uuid>),
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationFailure {
    pub registration_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationSweepReport {
    pub dry_run: bool,
    pub total: usize,
    /// Tasks created, or that would have been created in a dry run.
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<RegistrationFailure>,
    pub created_task_ids: Vec<Uuid>,
}

enum RegistrationOutcome {
    NotDue,
    WouldCreate,
    Created(Task),
}

#[derive(Clone)]
pub struct RegistrationGenerator {
    db: DBService,
}

impl RegistrationGenerator {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }

    pub async fn sweep(
        &self,
        scope: &RegistrationScope,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<RegistrationSweepReport, RegistrationGeneratorError> {
        let registrations = match scope {
            RegistrationScope::AllActive => TaskRegistration::find_all_active(&self.db.pool).await?,
            RegistrationScope::Only(ids) => {
                TaskRegistration::find_active_by_ids(&self.db.pool, ids).await?
            }
        };

        let mut report = RegistrationSweepReport {
            dry_run,
            total: registrations.len(),
            ..Default::default()
        };

        for registration in &registrations {
            match self.process_registration(registration, today, dry_run).await {
                Ok(RegistrationOutcome::NotDue) => report.skipped += 1,
                Ok(RegistrationOutcome::WouldCreate) => report.created += 1,
                Ok(RegistrationOutcome::Created(task)) => {
                    report.created += 1;
                    report.created_task_ids.push(task.id);
                }
                Err(e) => {
                    warn!(
                        registration_id = %registration.id,
                        error = %e,
                        "Registration sweep: failed to process registration"
                    );
                    report.errors.push(RegistrationFailure {
                        registration_id: registration.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        if report.errors.is_empty() {
            info!(
                total = report.total,
                created = report.created,
                skipped = report.skipped,
                dry_run,
                "Registration sweep complete"
            );
        } else {
            error!(
                total = report.total,
                created = report.created,
                skipped = report.skipped,
                failed = report.errors.len(),
                dry_run,
                "Registration sweep complete with errors"
            );
        }

        Ok(report)
    }

    async fn process_registration(
        &self,
        registration: &TaskRegistration,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<RegistrationOutcome, RegistrationGeneratorError> {
        let template = TaskTemplate::find_by_id(&self.db.pool, registration.task_template_id)
            .await?
            .ok_or(RegistrationGeneratorError::TemplateNotFound(
                registration.task_template_id,
            ))?;
        let component = HomeComponent::find_by_id(&self.db.pool, registration.home_component_id)
            .await?
            .ok_or(RegistrationGeneratorError::ComponentNotFound(
                registration.home_component_id,
            ))?;

        let frequency_months = registration
            .frequency_months
            .unwrap_or(template.frequency_months);

        let latest = Task::find_latest_for_component(
            &self.db.pool,
            registration.owner_id,
            component.id,
            &template.title,
        )
        .await?;

        if let Some(latest) = &latest {
            let last_due = latest
                .due_date
                .unwrap_or_else(|| latest.created_at.date_naive());
            let days_elapsed = (today - last_due).num_days();
            let threshold = i64::from(frequency_months) * APPROX_DAYS_PER_MONTH;
            if days_elapsed < threshold {
                debug!(
                    registration_id = %registration.id,
                    days_elapsed,
                    threshold,
                    "Registration not due yet"
                );
                return Ok(RegistrationOutcome::NotDue);
            }
        }

        if dry_run {
            info!(
                registration_id = %registration.id,
                title = %template.title,
                "Registration sweep (dry run): would create task"
            );
            return Ok(RegistrationOutcome::WouldCreate);
        }

        let due_date = today
            .checked_add_days(Days::new(DUE_DATE_BUFFER_DAYS))
            .ok_or(RegistrationGeneratorError::DateOutOfRange)?;
        let data = CreateTask {
            owner_id: registration.owner_id,
            home_id: registration.home_id,
            home_component_id: Some(component.id),
            title: template.title.clone(),
            description: Some(template.description.clone()).filter(|d| !d.trim().is_empty()),
            category: Some(component.category.to_string()),
            priority: Some(TaskPriority::Medium),
            status: Some(TaskStatus::Pending),
            due_date: Some(due_date),
            recurrence: None,
            parent_task_id: None,
        };

        let mut tx = self.db.pool.begin().await?;
        let task = Task::create(&mut *tx, &data, Uuid::new_v4()).await?;
        TaskRegistration::mark_generated(&mut *tx, registration.id, today, due_date).await?;
        tx.commit().await?;

        info!(
            registration_id = %registration.id,
            task_id = %task.id,
            due_date = %due_date,
            "Created task from registration"
        );
        Ok(RegistrationOutcome::Created(task))
    }
}
