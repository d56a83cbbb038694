use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use super::home_component::HomeComponent;

/// Links one component to one template and tracks its own generation cadence.
/// Unique per (component, template).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskRegistration {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub home_id: Option<Uuid>,
    pub home_component_id: Uuid,
    pub task_template_id: Uuid,
    pub frequency_months: Option<i32>, // None falls back to the template's frequency
    pub is_active: bool,
    pub last_task_generated: Option<NaiveDate>,
    pub next_task_due: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRegistration {
    /// Register `component` against a template. Returns the registration and
    /// whether it was created by this call.
    pub async fn get_or_create(
        pool: &SqlitePool,
        component: &HomeComponent,
        task_template_id: Uuid,
    ) -> Result<(Self, bool), sqlx::Error> {
        let inserted = sqlx::query_as::<_, TaskRegistration>(
            r#"INSERT INTO task_registrations (id, owner_id, home_id, home_component_id, task_template_id)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(home_component_id, task_template_id) DO NOTHING
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(component.owner_id)
        .bind(component.home_id)
        .bind(component.id)
        .bind(task_template_id)
        .fetch_optional(pool)
        .await?;

        if let Some(registration) = inserted {
            return Ok((registration, true));
        }

        let existing = Self::find_by_component_and_template(pool, component.id, task_template_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok((existing, false))
    }

    pub async fn find_by_component_and_template(
        pool: &SqlitePool,
        home_component_id: Uuid,
        task_template_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskRegistration>(
            r#"SELECT * FROM task_registrations
               WHERE home_component_id = ? AND task_template_id = ?"#,
        )
        .bind(home_component_id)
        .bind(task_template_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskRegistration>("SELECT * FROM task_registrations WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_all_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskRegistration>(
            "SELECT * FROM task_registrations WHERE is_active = 1 ORDER BY created_at ASC",
        )
        .fetch_all(pool)
        .await
    }

    /// Active registrations among `ids`, in the order given. Unknown ids are skipped.
    pub async fn find_active_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        let mut registrations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(registration) = Self::find_by_id(pool, *id).await?
                && registration.is_active
            {
                registrations.push(registration);
            }
        }
        Ok(registrations)
    }

    pub async fn find_by_component(
        pool: &SqlitePool,
        home_component_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskRegistration>(
            "SELECT * FROM task_registrations WHERE home_component_id = ? ORDER BY created_at ASC",
        )
        .bind(home_component_id)
        .fetch_all(pool)
        .await
    }

    /// Record that a task was generated on `generated_on`, due `next_due`.
    pub async fn mark_generated<'e, E>(
        executor: E,
        id: Uuid,
        generated_on: NaiveDate,
        next_due: NaiveDate,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"UPDATE task_registrations
               SET last_task_generated = ?, next_task_due = ?, updated_at = datetime('now', 'subsec')
               WHERE id = ?"#,
        )
        .bind(generated_on)
        .bind(next_due)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn set_frequency_override(
        pool: &SqlitePool,
        id: Uuid,
        frequency_months: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE task_registrations SET frequency_months = ?, updated_at = datetime('now', 'subsec') WHERE id = ?",
        )
        .bind(frequency_months)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_active(pool: &SqlitePool, id: Uuid, is_active: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE task_registrations SET is_active = ?, updated_at = datetime('now', 'subsec') WHERE id = ?",
        )
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
