use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::StageColor;
use crate::store::TenantEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_activity_type", rename_all = "snake_case")]
pub enum ActivityType {
    Note,
    Call,
    Email,
    Meeting,
    StageChange,
    StatusChange,
}

/// One entry in a lead's audit trail. Written by lifecycle transitions and
/// manual notes; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeadActivity {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub lead_id: Uuid,
    pub activity_type: ActivityType,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LeadActivity {
    pub fn new(
        hub_id: Uuid,
        lead_id: Uuid,
        activity_type: ActivityType,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hub_id,
            lead_id,
            activity_type,
            description: description.into(),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn icon(&self) -> &'static str {
        match self.activity_type {
            ActivityType::Note => "document-text-outline",
            ActivityType::Call => "call-outline",
            ActivityType::Email => "mail-outline",
            ActivityType::Meeting => "calendar-outline",
            ActivityType::StageChange => "git-branch-outline",
            ActivityType::StatusChange => "flag-outline",
        }
    }

    pub fn color(&self) -> StageColor {
        match self.activity_type {
            ActivityType::Note => StageColor::Primary,
            ActivityType::Call => StageColor::Success,
            ActivityType::Email => StageColor::Info,
            ActivityType::Meeting => StageColor::Warning,
            ActivityType::StageChange => StageColor::Secondary,
            ActivityType::StatusChange => StageColor::Danger,
        }
    }
}

impl TenantEntity for LeadActivity {
    const ENTITY: &'static str = "activity";

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
