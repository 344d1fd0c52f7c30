use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::LeadSource;
use crate::store::TenantEntity;

/// Reusable reason a lead was lost, managed per hub.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LossReason {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LossReason {
    pub fn new(hub_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hub_id,
            name: name.into(),
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

impl TenantEntity for LossReason {
    const ENTITY: &'static str = "loss reason";

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

/// Singleton module configuration, one row per hub.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeadSettings {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub default_pipeline_id: Option<Uuid>,
    pub auto_create_customer_on_win: bool,
    pub default_source: LeadSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LeadSettings {
    pub fn new(hub_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hub_id,
            default_pipeline_id: None,
            auto_create_customer_on_win: false,
            default_source: LeadSource::Manual,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// Fields accepted when saving the hub settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub default_pipeline_id: Option<Uuid>,
    pub auto_create_customer_on_win: bool,
    pub default_source: LeadSource,
}
