use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use super::recurrence::{DayOfMonthSpec, RecurrencePattern};

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_status", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Dismissed,
}

impl TaskStatus {
    /// Pending and in-progress tasks still ask something of the owner.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// A task row. Recurring definitions and the concrete instances they spawn share
/// this table: definitions have `is_recurring = true` and no parent, instances
/// have `is_recurring = false` and point at their definition via `parent_task_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub home_id: Option<Uuid>,
    pub home_component_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub recurrence_interval: i32,
    pub recurrence_days_of_week: Option<String>, // JSON list of weekday indices, 0 = Sunday
    pub recurrence_days_of_month: Option<String>, // JSON-serialized DayOfMonthSpec
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_task_id: Option<Uuid>, // Recurring definition this instance was generated from
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Recurrence settings supplied when creating a recurring definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecurrence {
    pub pattern: RecurrencePattern,
    pub interval: i32,
    pub days_of_week: Option<Vec<u8>>,
    pub days_of_month: Option<DayOfMonthSpec>,
    pub end_date: Option<NaiveDate>,
}

impl CreateRecurrence {
    pub fn new(pattern: RecurrencePattern, interval: i32) -> Self {
        Self {
            pattern,
            interval,
            days_of_week: None,
            days_of_month: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub owner_id: Uuid,
    pub home_id: Option<Uuid>,
    pub home_component_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<NaiveDate>,
    pub recurrence: Option<CreateRecurrence>,
    pub parent_task_id: Option<Uuid>,
}

impl CreateTask {
    pub fn from_title_description(
        owner_id: Uuid,
        title: String,
        description: Option<String>,
    ) -> Self {
        Self {
            owner_id,
            home_id: None,
            home_component_id: None,
            title,
            description,
            category: None,
            priority: None,
            status: Some(TaskStatus::Pending),
            due_date: None,
            recurrence: None,
            parent_task_id: None,
        }
    }

    /// A recurring definition anchored at `due_date`.
    pub fn recurring_definition(
        owner_id: Uuid,
        title: String,
        due_date: NaiveDate,
        recurrence: CreateRecurrence,
    ) -> Self {
        Self {
            due_date: Some(due_date),
            recurrence: Some(recurrence),
            ..Self::from_title_description(owner_id, title, None)
        }
    }

    /// A concrete instance of `definition` due on `due_date`.
    /// Instances are never recurring themselves.
    pub fn instance_of(definition: &Task, due_date: NaiveDate) -> Self {
        Self {
            owner_id: definition.owner_id,
            home_id: definition.home_id,
            home_component_id: definition.home_component_id,
            title: definition.title.clone(),
            description: definition.description.clone(),
            category: definition.category.clone(),
            priority: Some(definition.priority),
            status: Some(TaskStatus::Pending),
            due_date: Some(due_date),
            recurrence: None,
            parent_task_id: Some(definition.id),
        }
    }
}

/// Recurring definition counts for one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringTaskStats {
    pub total_recurring: i64,
    pub active_recurring: i64,
    pub inactive_recurring: i64,
}

impl Task {
    pub fn is_definition(&self) -> bool {
        self.is_recurring && self.parent_task_id.is_none()
    }

    pub async fn create<'e, E>(executor: E, data: &CreateTask, task_id: Uuid) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let status = data.status.unwrap_or_default();
        let priority = data.priority.unwrap_or_default();
        let recurrence = data.recurrence.as_ref();
        let days_of_week = recurrence
            .and_then(|r| r.days_of_week.as_ref())
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let days_of_month = recurrence
            .and_then(|r| r.days_of_month.as_ref())
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query_as::<_, Task>(
            r#"INSERT INTO tasks (id, owner_id, home_id, home_component_id, title, description, category,
                                  priority, status, due_date, is_recurring, recurrence_pattern,
                                  recurrence_interval, recurrence_days_of_week, recurrence_days_of_month,
                                  recurrence_end_date, parent_task_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(task_id)
        .bind(data.owner_id)
        .bind(data.home_id)
        .bind(data.home_component_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.category)
        .bind(priority)
        .bind(status)
        .bind(data.due_date)
        .bind(recurrence.is_some())
        .bind(recurrence.map(|r| r.pattern.to_string()))
        .bind(recurrence.map(|r| r.interval).unwrap_or(1))
        .bind(days_of_week)
        .bind(days_of_month)
        .bind(recurrence.and_then(|r| r.end_date))
        .bind(data.parent_task_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Every recurring definition (recurring, not itself an instance), oldest first.
    pub async fn find_recurring_definitions(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"SELECT * FROM tasks
               WHERE is_recurring = 1 AND parent_task_id IS NULL
               ORDER BY created_at ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    /// Instances generated from `parent_task_id`, newest due date first.
    pub async fn find_instances(
        pool: &SqlitePool,
        parent_task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"SELECT * FROM tasks
               WHERE parent_task_id = ?
               ORDER BY due_date DESC, created_at DESC"#,
        )
        .bind(parent_task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_active_instances(
        pool: &SqlitePool,
        parent_task_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM tasks
               WHERE parent_task_id = ? AND status IN ('pending', 'in-progress')"#,
        )
        .bind(parent_task_id)
        .fetch_one(pool)
        .await
    }

    /// Move every pending or in-progress instance of `parent_task_id` to dismissed.
    pub async fn dismiss_active_instances<'e, E>(
        executor: E,
        parent_task_id: Uuid,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE tasks
               SET status = 'dismissed', updated_at = datetime('now', 'subsec')
               WHERE parent_task_id = ? AND status IN ('pending', 'in-progress')"#,
        )
        .bind(parent_task_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = datetime('now', 'subsec') WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Latest task for a component carrying `title`, regardless of status.
    /// Registrations find their previous task this way; there is no direct link.
    pub async fn find_latest_for_component(
        pool: &SqlitePool,
        owner_id: Uuid,
        home_component_id: Uuid,
        title: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"SELECT * FROM tasks
               WHERE owner_id = ? AND home_component_id = ? AND title = ?
               ORDER BY due_date DESC, created_at DESC
               LIMIT 1"#,
        )
        .bind(owner_id)
        .bind(home_component_id)
        .bind(title)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_component(
        pool: &SqlitePool,
        home_component_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"SELECT * FROM tasks
               WHERE home_component_id = ?
               ORDER BY created_at ASC"#,
        )
        .bind(home_component_id)
        .fetch_all(pool)
        .await
    }

    /// A definition counts as active until the day after its end date.
    pub async fn recurring_stats(
        pool: &SqlitePool,
        owner_id: Uuid,
        today: NaiveDate,
    ) -> Result<RecurringTaskStats, sqlx::Error> {
        let (total_recurring, active_recurring): (i64, i64) = sqlx::query_as(
            r#"SELECT
                 COUNT(*),
                 COALESCE(SUM(CASE WHEN recurrence_end_date IS NULL OR recurrence_end_date >= ?
                                   THEN 1 ELSE 0 END), 0)
               FROM tasks
               WHERE owner_id = ? AND is_recurring = 1 AND parent_task_id IS NULL"#,
        )
        .bind(today)
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        Ok(RecurringTaskStats {
            total_recurring,
            active_recurring,
            inactive_recurring: total_recurring - active_recurring,
        })
    }
}
