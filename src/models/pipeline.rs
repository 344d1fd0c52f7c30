use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::store::TenantEntity;

/// Badge color used by stages and derived display fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "stage_color", rename_all = "snake_case")]
pub enum StageColor {
    Primary,
    Secondary,
    Success,
    Warning,
    Danger,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pipeline {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn new(hub_id: Uuid, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hub_id,
            name: name.into(),
            description: description.into(),
            is_default: false,
            is_active: true,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

impl TenantEntity for Pipeline {
    const ENTITY: &'static str = "pipeline";

    fn id(&self) -> Uuid {
        self.id
    }

    fn hub_id(&self) -> Uuid {
        self.hub_id
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.updated_at = at;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineStage {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub order: i32,
    pub probability: i32,
    pub color: StageColor,
    pub is_won: bool,
    pub is_lost: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PipelineStage {
    pub fn new(hub_id: Uuid, pipeline_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hub_id,
            pipeline_id,
            name: name.into(),
            order: 0,
            probability: 0,
            color: StageColor::Primary,
            is_won: false,
            is_lost: false,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Stages flagged won or lost end the lead lifecycle when entered.
    pub fn is_terminal(&self) -> bool {
        self.is_won || self.is_lost
    }
}

impl TenantEntity for PipelineStage {
    const ENTITY: &'static str = "stage";

    fn id(&self) -> Uuid {
        self.id
    }

    fn hub_id(&self) -> Uuid {
        self.hub_id
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.updated_at = at;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Fields accepted when adding a stage to a pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStage {
    pub name: String,
    pub probability: i32,
    pub color: Option<StageColor>,
    pub is_won: bool,
    pub is_lost: bool,
}
