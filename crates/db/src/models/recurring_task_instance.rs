use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task {0} is already recorded as a recurring instance")]
    DuplicateInstance(Uuid),
}

/// Ledger entry linking a recurring definition to one instance it produced.
/// An instance appears at most once; a definition appears once per instance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecurringTaskInstance {
    pub id: Uuid,
    pub recurring_task_id: Uuid,
    pub instance_task_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl RecurringTaskInstance {
    pub async fn record<'e, E>(
        executor: E,
        recurring_task_id: Uuid,
        instance_task_id: Uuid,
    ) -> Result<Self, LedgerError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, RecurringTaskInstance>(
            r#"INSERT INTO recurring_task_instances (id, recurring_task_id, instance_task_id)
               VALUES (?, ?, ?)
               RETURNING *"#,
        )
        .bind(id)
        .bind(recurring_task_id)
        .bind(instance_task_id)
        .fetch_one(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LedgerError::DuplicateInstance(instance_task_id)
            }
            other => LedgerError::Database(other),
        })
    }

    /// Due date of the newest instance generated for `recurring_task_id`.
    pub async fn most_recent_instance_date<'e, E>(
        executor: E,
        recurring_task_id: Uuid,
    ) -> Result<Option<NaiveDate>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, NaiveDate>(
            r#"SELECT t.due_date
               FROM recurring_task_instances r
               JOIN tasks t ON t.id = r.instance_task_id
               WHERE r.recurring_task_id = ? AND t.due_date IS NOT NULL
               ORDER BY t.due_date DESC
               LIMIT 1"#,
        )
        .bind(recurring_task_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_recurring_task_id(
        pool: &SqlitePool,
        recurring_task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RecurringTaskInstance>(
            r#"SELECT r.*
               FROM recurring_task_instances r
               JOIN tasks t ON t.id = r.instance_task_id
               WHERE r.recurring_task_id = ?
               ORDER BY t.due_date DESC"#,
        )
        .bind(recurring_task_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::{
            recurrence::RecurrencePattern,
            task::{CreateRecurrence, CreateTask, Task},
        },
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn definition(db: &DBService) -> Task {
        Task::create(
            &db.pool,
            &CreateTask::recurring_definition(
                Uuid::new_v4(),
                "Clean gutters".to_string(),
                date(2024, 1, 1),
                CreateRecurrence::new(RecurrencePattern::Monthly, 1),
            ),
            Uuid::new_v4(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_most_recent_instance_date_uses_max_due_date() {
        let db = DBService::new_in_memory().await.unwrap();
        let definition = definition(&db).await;

        assert_eq!(
            RecurringTaskInstance::most_recent_instance_date(&db.pool, definition.id)
                .await
                .unwrap(),
            None
        );

        // Recorded out of order on purpose.
        for due in [date(2024, 3, 1), date(2024, 2, 1)] {
            let instance = Task::create(
                &db.pool,
                &CreateTask::instance_of(&definition, due),
                Uuid::new_v4(),
            )
            .await
            .unwrap();
            RecurringTaskInstance::record(&db.pool, definition.id, instance.id)
                .await
                .unwrap();
        }

        assert_eq!(
            RecurringTaskInstance::most_recent_instance_date(&db.pool, definition.id)
                .await
                .unwrap(),
            Some(date(2024, 3, 1))
        );
        let entries = RecurringTaskInstance::find_by_recurring_task_id(&db.pool, definition.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_record_rejects_duplicate_instance() {
        let db = DBService::new_in_memory().await.unwrap();
        let definition = definition(&db).await;
        let instance = Task::create(
            &db.pool,
            &CreateTask::instance_of(&definition, date(2024, 2, 1)),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        RecurringTaskInstance::record(&db.pool, definition.id, instance.id)
            .await
            .unwrap();
        let err = RecurringTaskInstance::record(&db.pool, definition.id, instance.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateInstance(id) if id == instance.id));

        let entries = RecurringTaskInstance::find_by_recurring_task_id(&db.pool, definition.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }
}
