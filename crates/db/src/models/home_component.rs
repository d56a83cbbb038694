use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Fixed component taxonomy shared by components and task templates.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[sqlx(type_name = "component_category")]
pub enum ComponentCategory {
    Appliances,
    #[sqlx(rename = "HVAC")]
    #[serde(rename = "HVAC")]
    #[strum(serialize = "HVAC")]
    Hvac,
    Plumbing,
    Electrical,
    Roofing,
    #[sqlx(rename = "Windows & Doors")]
    #[serde(rename = "Windows & Doors")]
    #[strum(serialize = "Windows & Doors")]
    WindowsAndDoors,
    Flooring,
    Gutters,
    #[sqlx(rename = "Water Heater")]
    #[serde(rename = "Water Heater")]
    #[strum(serialize = "Water Heater")]
    WaterHeater,
    #[sqlx(rename = "Security System")]
    #[serde(rename = "Security System")]
    #[strum(serialize = "Security System")]
    SecuritySystem,
    #[sqlx(rename = "Garage Door")]
    #[serde(rename = "Garage Door")]
    #[strum(serialize = "Garage Door")]
    GarageDoor,
    #[sqlx(rename = "Sump Pump")]
    #[serde(rename = "Sump Pump")]
    #[strum(serialize = "Sump Pump")]
    SumpPump,
    Other,
}

/// Something in a home that needs maintenance: a furnace, a roof, a dishwasher.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HomeComponent {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub home_id: Option<Uuid>,
    pub name: String,
    pub category: ComponentCategory,
    pub brand: String,
    pub model: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHomeComponent {
    pub owner_id: Uuid,
    pub home_id: Option<Uuid>,
    pub name: String,
    pub category: ComponentCategory,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub notes: Option<String>,
}

impl CreateHomeComponent {
    pub fn new(owner_id: Uuid, name: impl Into<String>, category: ComponentCategory) -> Self {
        Self {
            owner_id,
            home_id: None,
            name: name.into(),
            category,
            brand: None,
            model: None,
            notes: None,
        }
    }
}

impl HomeComponent {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateHomeComponent,
        component_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, HomeComponent>(
            r#"INSERT INTO home_components (id, owner_id, home_id, name, category, brand, model, notes)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(component_id)
        .bind(data.owner_id)
        .bind(data.home_id)
        .bind(&data.name)
        .bind(data.category)
        .bind(data.brand.clone().unwrap_or_default())
        .bind(data.model.clone().unwrap_or_default())
        .bind(data.notes.clone().unwrap_or_default())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, HomeComponent>("SELECT * FROM home_components WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Components matching the optional owner and home filters, oldest first.
    pub async fn find_filtered(
        pool: &SqlitePool,
        owner_id: Option<Uuid>,
        home_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HomeComponent>(
            r#"SELECT * FROM home_components
               WHERE (?1 IS NULL OR owner_id = ?1)
                 AND (?2 IS NULL OR home_id = ?2)
               ORDER BY created_at ASC"#,
        )
        .bind(owner_id)
        .bind(home_id)
        .fetch_all(pool)
        .await
    }
}
