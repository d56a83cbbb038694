//! Sweep that turns due recurring definitions into concrete task instances.

use chrono::NaiveDate;
use db::{
    DBService,
    models::{
        recurring_task_instance::{LedgerError, RecurringTaskInstance},
        task::{CreateTask, Task},
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{notification::NotificationService, recurrence::RecurrenceResolver};

#[derive(Debug, Error)]
pub enum RecurrenceSchedulerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One definition that could not be processed during a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub definition_id: Uuid,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecurrenceSweepReport {
    pub dry_run: bool,
    /// Instances created, or that would have been created in a dry run.
    pub created_count: usize,
    pub created_task_ids: Vec<Uuid>,
    pub errors: Vec<SweepFailure>,
}

enum DefinitionOutcome {
    NotDue,
    WouldCreate,
    Created(Task),
}

#[derive(Clone)]
pub struct RecurrenceScheduler {
    db: DBService,
    resolver: RecurrenceResolver,
    notifications: NotificationService,
}

impl RecurrenceScheduler {
    pub fn new(db: DBService, notifications: NotificationService) -> Self {
        Self {
            db,
            resolver: RecurrenceResolver,
            notifications,
        }
    }

    /// Generate the next instance of every recurring definition due on or before
    /// `today`. Failures are collected per definition; only failing to load the
    /// definitions themselves is returned as an error.
    pub async fn sweep(
        &self,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<RecurrenceSweepReport, RecurrenceSchedulerError> {
        let definitions = Task::find_recurring_definitions(&self.db.pool).await?;
        let mut report = RecurrenceSweepReport {
            dry_run,
            ..Default::default()
        };

        if definitions.is_empty() {
            debug!("Recurring sweep: no recurring definitions");
            return Ok(report);
        }

        for definition in &definitions {
            match self.process_definition(definition, today, dry_run).await {
                Ok(DefinitionOutcome::NotDue) => {}
                Ok(DefinitionOutcome::WouldCreate) => report.created_count += 1,
                Ok(DefinitionOutcome::Created(instance)) => {
                    report.created_count += 1;
                    report.created_task_ids.push(instance.id);
                    self.notifications
                        .dispatch_task_created(instance.owner_id, instance);
                }
                Err(e) => {
                    warn!(
                        task_id = %definition.id,
                        error = %e,
                        "Recurring sweep: failed to process definition"
                    );
                    report.errors.push(SweepFailure {
                        definition_id: definition.id,
                        title: definition.title.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if report.errors.is_empty() {
            info!(
                definitions = definitions.len(),
                created = report.created_count,
                dry_run,
                "Recurring sweep complete"
            );
        } else {
            error!(
                definitions = definitions.len(),
                created = report.created_count,
                failed = report.errors.len(),
                dry_run,
                "Recurring sweep complete with errors"
            );
        }

        Ok(report)
    }

    async fn process_definition(
        &self,
        definition: &Task,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<DefinitionOutcome, RecurrenceSchedulerError> {
        let last_generated =
            RecurringTaskInstance::most_recent_instance_date(&self.db.pool, definition.id).await?;

        let Some(next_due) = self.resolver.next_due_date(definition, last_generated) else {
            return Ok(DefinitionOutcome::NotDue);
        };
        if next_due > today {
            debug!(task_id = %definition.id, next_due = %next_due, "Recurring task not due yet");
            return Ok(DefinitionOutcome::NotDue);
        }
        if let Some(end_date) = definition.recurrence_end_date
            && next_due > end_date
        {
            debug!(
                task_id = %definition.id,
                next_due = %next_due,
                end_date = %end_date,
                "Recurring task past its end date"
            );
            return Ok(DefinitionOutcome::NotDue);
        }

        if dry_run {
            info!(
                task_id = %definition.id,
                next_due = %next_due,
                "Recurring sweep (dry run): would create instance"
            );
            return Ok(DefinitionOutcome::WouldCreate);
        }

        let mut tx = self.db.pool.begin().await?;
        let dismissed = Task::dismiss_active_instances(&mut *tx, definition.id).await?;
        let instance = Task::create(
            &mut *tx,
            &CreateTask::instance_of(definition, next_due),
            Uuid::new_v4(),
        )
        .await?;
        RecurringTaskInstance::record(&mut *tx, definition.id, instance.id).await?;
        tx.commit().await?;

        info!(
            task_id = %definition.id,
            instance_id = %instance.id,
            due_date = %next_due,
            dismissed,
            "Created recurring task instance"
        );
        Ok(DefinitionOutcome::Created(instance))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use db::models::{
        recurrence::RecurrencePattern,
        task::{CreateRecurrence, TaskStatus},
    };

    use super::*;
    use crate::services::notification::{NotificationError, TaskNotifier};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn definition(
        db: &DBService,
        title: &str,
        due: NaiveDate,
        recurrence: CreateRecurrence,
    ) -> Task {
        Task::create(
            &db.pool,
            &CreateTask::recurring_definition(Uuid::new_v4(), title.to_string(), due, recurrence),
            Uuid::new_v4(),
        )
        .await
        .unwrap()
    }

    fn scheduler(db: &DBService) -> RecurrenceScheduler {
        RecurrenceScheduler::new(db.clone(), NotificationService::disabled())
    }

    #[tokio::test]
    async fn test_sweep_creates_due_instance_once_per_day() {
        let db = DBService::new_in_memory().await.unwrap();
        let def = definition(
            &db,
            "Clean dryer vent",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Daily, 1),
        )
        .await;
        let scheduler = scheduler(&db);

        let report = scheduler.sweep(date(2024, 1, 2), false).await.unwrap();
        assert_eq!(report.created_count, 1);
        assert!(report.errors.is_empty());

        let instances = Task::find_instances(&db.pool, def.id).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].due_date, Some(date(2024, 1, 2)));
        assert_eq!(instances[0].status, TaskStatus::Pending);
        assert_eq!(instances[0].title, def.title);
        assert_eq!(report.created_task_ids, vec![instances[0].id]);

        let again = scheduler.sweep(date(2024, 1, 2), false).await.unwrap();
        assert_eq!(again.created_count, 0);
    }

    #[tokio::test]
    async fn test_new_instance_dismisses_previous_active_one() {
        let db = DBService::new_in_memory().await.unwrap();
        let def = definition(
            &db,
            "Water the lawn",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Daily, 1),
        )
        .await;
        let scheduler = scheduler(&db);

        for day in 2..=5 {
            scheduler.sweep(date(2024, 1, day), false).await.unwrap();
            assert!(Task::count_active_instances(&db.pool, def.id).await.unwrap() <= 1);
        }

        let instances = Task::find_instances(&db.pool, def.id).await.unwrap();
        assert_eq!(instances.len(), 4);
        assert_eq!(instances[0].due_date, Some(date(2024, 1, 5)));
        assert_eq!(instances[0].status, TaskStatus::Pending);
        assert!(instances[1..].iter().all(|t| t.status == TaskStatus::Dismissed));
    }

    #[tokio::test]
    async fn test_completed_instance_is_not_dismissed() {
        let db = DBService::new_in_memory().await.unwrap();
        let def = definition(
            &db,
            "Check smoke detectors",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Daily, 1),
        )
        .await;
        let scheduler = scheduler(&db);

        let first = scheduler.sweep(date(2024, 1, 2), false).await.unwrap();
        Task::update_status(&db.pool, first.created_task_ids[0], TaskStatus::Completed)
            .await
            .unwrap();
        scheduler.sweep(date(2024, 1, 3), false).await.unwrap();

        let completed = Task::find_by_id(&db.pool, first.created_task_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(Task::count_active_instances(&db.pool, def.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_mutating() {
        let db = DBService::new_in_memory().await.unwrap();
        let a = definition(
            &db,
            "Test GFCI outlets",
            date(2024, 1, 15),
            CreateRecurrence::new(RecurrencePattern::Monthly, 1),
        )
        .await;
        let b = definition(
            &db,
            "Sweep porch",
            date(2024, 2, 10),
            CreateRecurrence::new(RecurrencePattern::Weekly, 1),
        )
        .await;
        let scheduler = scheduler(&db);
        let today = date(2024, 2, 20);

        let dry = scheduler.sweep(today, true).await.unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.created_count, 2);
        assert!(dry.created_task_ids.is_empty());
        for def in [&a, &b] {
            assert!(Task::find_instances(&db.pool, def.id).await.unwrap().is_empty());
            assert!(
                RecurringTaskInstance::find_by_recurring_task_id(&db.pool, def.id)
                    .await
                    .unwrap()
                    .is_empty()
            );
        }

        let real = scheduler.sweep(today, false).await.unwrap();
        assert_eq!(real.created_count, dry.created_count);
    }

    #[tokio::test]
    async fn test_future_and_ended_definitions_are_skipped() {
        let db = DBService::new_in_memory().await.unwrap();
        definition(
            &db,
            "Inspect roof",
            date(2024, 6, 1),
            CreateRecurrence::new(RecurrencePattern::Yearly, 1),
        )
        .await;
        let mut ended = CreateRecurrence::new(RecurrencePattern::Daily, 1);
        ended.end_date = Some(date(2024, 1, 1));
        definition(&db, "Old chore", date(2024, 1, 1), ended).await;

        let report = scheduler(&db).sweep(date(2024, 6, 30), false).await.unwrap();
        assert_eq!(report.created_count, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_instance_due_on_end_date_is_created() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut last_day = CreateRecurrence::new(RecurrencePattern::Daily, 1);
        last_day.end_date = Some(date(2024, 1, 2));
        let def = definition(&db, "Run the sprinklers", date(2024, 1, 1), last_day).await;
        let scheduler = scheduler(&db);

        let report = scheduler.sweep(date(2024, 1, 5), false).await.unwrap();
        assert_eq!(report.created_count, 1);
        let instances = Task::find_instances(&db.pool, def.id).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].due_date, Some(date(2024, 1, 2)));

        let after_end = scheduler.sweep(date(2024, 1, 6), false).await.unwrap();
        assert_eq!(after_end.created_count, 0);
    }

    #[tokio::test]
    async fn test_one_failing_definition_does_not_stop_the_sweep() {
        let db = DBService::new_in_memory().await.unwrap();
        let broken = definition(
            &db,
            "Broken",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Daily, 1),
        )
        .await;
        let healthy = definition(
            &db,
            "Healthy",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Daily, 1),
        )
        .await;
        let scheduler = scheduler(&db);

        scheduler.sweep(date(2024, 1, 2), false).await.unwrap();
        sqlx::query(
            r#"CREATE TRIGGER reject_broken_instances BEFORE INSERT ON tasks
               WHEN NEW.title = 'Broken' AND NEW.parent_task_id IS NOT NULL
               BEGIN SELECT RAISE(ABORT, 'instance rejected'); END"#,
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let report = scheduler.sweep(date(2024, 1, 3), false).await.unwrap();
        assert_eq!(report.created_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].definition_id, broken.id);
        assert!(report.errors[0].message.contains("instance rejected"));

        // The dismissal rolled back with the failed insert.
        assert_eq!(Task::count_active_instances(&db.pool, broken.id).await.unwrap(), 1);
        let healthy_instances = Task::find_instances(&db.pool, healthy.id).await.unwrap();
        assert_eq!(healthy_instances[0].due_date, Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn test_unknown_pattern_is_skipped() {
        let db = DBService::new_in_memory().await.unwrap();
        let def = definition(
            &db,
            "Mystery",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Daily, 1),
        )
        .await;
        sqlx::query("UPDATE tasks SET recurrence_pattern = 'fortnightly' WHERE id = ?")
            .bind(def.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let report = scheduler(&db).sweep(date(2024, 2, 1), false).await.unwrap();
        assert_eq!(report.created_count, 0);
        assert!(report.errors.is_empty());
    }

    struct FailingNotifier {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskNotifier for FailingNotifier {
        async fn task_created(&self, _owner_id: Uuid, _task: &Task) -> Result<(), NotificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NotificationError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_sweep() {
        let db = DBService::new_in_memory().await.unwrap();
        let def = definition(
            &db,
            "Replace HVAC filter",
            date(2024, 1, 1),
            CreateRecurrence::new(RecurrencePattern::Monthly, 3),
        )
        .await;
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = RecurrenceScheduler::new(
            db.clone(),
            NotificationService::new(Arc::new(FailingNotifier {
                calls: calls.clone(),
            })),
        );

        let report = scheduler.sweep(date(2024, 4, 1), false).await.unwrap();
        assert_eq!(report.created_count, 1);
        assert!(report.errors.is_empty());
        let instances = Task::find_instances(&db.pool, def.id).await.unwrap();
        assert_eq!(instances[0].due_date, Some(date(2024, 4, 1)));

        assert!(
            scheduler
                .notifications
                .drain(NotificationService::DRAIN_TIMEOUT)
                .await
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct CountingNotifier {
        delivered: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskNotifier for CountingNotifier {
        async fn task_created(&self, _owner_id: Uuid, _task: &Task) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_drained_notifications_survive_runtime_shutdown() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let notifications = NotificationService::new(Arc::new(CountingNotifier {
            delivered: delivered.clone(),
        }));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let created = runtime.block_on(async {
            let db = DBService::new_in_memory().await.unwrap();
            definition(
                &db,
                "Descale kettle",
                date(2024, 1, 1),
                CreateRecurrence::new(RecurrencePattern::Daily, 1),
            )
            .await;
            let report = RecurrenceScheduler::new(db, notifications.clone())
                .sweep(date(2024, 1, 2), false)
                .await
                .unwrap();
            assert!(notifications.drain(NotificationService::DRAIN_TIMEOUT).await);
            report.created_count
        });
        drop(runtime);

        assert_eq!(created, 1);
        assert_eq!(delivered.load(Ordering::SeqCst), created);
    }
}
