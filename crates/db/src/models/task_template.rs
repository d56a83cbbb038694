use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use uuid::Uuid;

use super::home_component::ComponentCategory;

/// Library entry describing a maintenance action for a class of components,
/// plus the criteria used to decide which components it applies to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ComponentCategory,
    pub subcategory: Option<String>,
    pub match_keywords: Json<Vec<String>>,
    pub match_brands: Json<Vec<String>>,
    pub importance: Option<String>,
    pub safety_warning: Option<String>,
    pub tools_needed: Json<Vec<String>>,
    pub estimated_cost_diy: Option<f64>,
    pub estimated_cost_professional: Option<f64>,
    pub frequency_months: i32,
    pub season: Option<String>,
    pub region: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskTemplate {
    pub title: String,
    pub description: String,
    pub category: ComponentCategory,
    pub subcategory: Option<String>,
    pub match_keywords: Vec<String>,
    pub match_brands: Vec<String>,
    pub importance: Option<String>,
    pub safety_warning: Option<String>,
    pub tools_needed: Vec<String>,
    pub estimated_cost_diy: Option<f64>,
    pub estimated_cost_professional: Option<f64>,
    pub frequency_months: i32,
    pub season: Option<String>,
    pub region: Option<String>,
    pub is_active: bool,
}

impl CreateTaskTemplate {
    /// An active template with no brand or keyword constraints.
    pub fn new(title: impl Into<String>, category: ComponentCategory, frequency_months: i32) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category,
            subcategory: None,
            match_keywords: Vec::new(),
            match_brands: Vec::new(),
            importance: None,
            safety_warning: None,
            tools_needed: Vec::new(),
            estimated_cost_diy: None,
            estimated_cost_professional: None,
            frequency_months,
            season: None,
            region: None,
            is_active: true,
        }
    }
}

impl TaskTemplate {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTaskTemplate,
        template_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TaskTemplate>(
            r#"INSERT INTO task_templates (id, title, description, category, subcategory, match_keywords,
                                           match_brands, importance, safety_warning, tools_needed,
                                           estimated_cost_diy, estimated_cost_professional,
                                           frequency_months, season, region, is_active)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(template_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.category)
        .bind(&data.subcategory)
        .bind(Json(&data.match_keywords))
        .bind(Json(&data.match_brands))
        .bind(&data.importance)
        .bind(&data.safety_warning)
        .bind(Json(&data.tools_needed))
        .bind(data.estimated_cost_diy)
        .bind(data.estimated_cost_professional)
        .bind(data.frequency_months)
        .bind(&data.season)
        .bind(&data.region)
        .bind(data.is_active)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskTemplate>("SELECT * FROM task_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_all_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskTemplate>(
            "SELECT * FROM task_templates WHERE is_active = 1 ORDER BY category, title",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn set_active(pool: &SqlitePool, id: Uuid, is_active: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE task_templates SET is_active = ?, updated_at = datetime('now', 'subsec') WHERE id = ?",
        )
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
