//! Startup check that the schema the sweeps rely on is in place.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

/// Tables the sweeps read and write.
pub const REQUIRED_TABLES: &[&str] = &[
    "home_components",
    "tasks",
    "recurring_task_instances",
    "task_templates",
    "task_registrations",
];

#[derive(Debug, Error)]
pub enum DatabaseValidationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct DatabaseValidator {
    pool: SqlitePool,
}

impl DatabaseValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn validate(&self) -> Result<ValidationResult, DatabaseValidationError> {
        if !self.table_exists("_sqlx_migrations").await? {
            warn!("Database not initialized: _sqlx_migrations table does not exist");
            return Ok(ValidationResult {
                is_initialized: false,
                migrations_applied: 0,
                latest_migration: None,
                missing_tables: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
            });
        }

        let migrations_applied =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&self.pool)
                .await?;
        let latest_migration = sqlx::query_scalar::<_, String>(
            "SELECT description FROM _sqlx_migrations WHERE success = 1 ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let missing_tables = self.missing_tables(REQUIRED_TABLES).await?;

        let result = ValidationResult {
            is_initialized: true,
            migrations_applied: usize::try_from(migrations_applied).unwrap_or_default(),
            latest_migration,
            missing_tables,
        };
        if result.is_ok() {
            info!(
                migrations_applied = result.migrations_applied,
                latest = ?result.latest_migration,
                "Database validation complete"
            );
        } else {
            warn!(missing = ?result.missing_tables, "Database is missing required tables");
        }
        Ok(result)
    }

    pub async fn missing_tables(
        &self,
        required: &[&str],
    ) -> Result<Vec<String>, DatabaseValidationError> {
        let mut missing = Vec::new();
        for table in required {
            if !self.table_exists(table).await? {
                missing.push(table.to_string());
            }
        }
        Ok(missing)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DatabaseValidationError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_initialized: bool,
    pub migrations_applied: usize,
    pub latest_migration: Option<String>,
    pub missing_tables: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.is_initialized && self.missing_tables.is_empty()
    }

    pub fn summary(&self) -> String {
        if !self.is_initialized {
            "Database not initialized - migrations need to be run".to_string()
        } else if !self.missing_tables.is_empty() {
            format!("Database is missing tables: {}", self.missing_tables.join(", "))
        } else {
            format!("Database OK - {} migrations applied", self.migrations_applied)
        }
    }
}
