use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::StageColor;
use crate::store::TenantEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_source", rename_all = "snake_case")]
pub enum LeadSource {
    Manual,
    Website,
    Referral,
    Campaign,
    Social,
    Import,
    WalkIn,
    Phone,
    Other,
}

impl Default for LeadSource {
    fn default() -> Self {
        LeadSource::Manual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_priority", rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
pub enum LeadStatus {
    Open,
    Won,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub value: Decimal,
    pub expected_close_date: Option<NaiveDate>,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub source: LeadSource,
    pub priority: Priority,
    pub notes: Option<String>,
    pub status: LeadStatus,
    pub won_date: Option<DateTime<Utc>>,
    pub lost_date: Option<DateTime<Utc>>,
    pub loss_reason_id: Option<Uuid>,
    pub stage_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn new(hub_id: Uuid, name: impl Into<String>, pipeline_id: Uuid, stage_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hub_id,
            name: name.into(),
            email: None,
            phone: None,
            company: None,
            value: Decimal::ZERO,
            expected_close_date: None,
            pipeline_id,
            stage_id,
            assigned_to: None,
            customer_id: None,
            source: LeadSource::Manual,
            priority: Priority::Medium,
            notes: None,
            status: LeadStatus::Open,
            won_date: None,
            lost_date: None,
            loss_reason_id: None,
            stage_changed_at: now,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Two-letter avatar initials derived from the name.
    pub fn initials(&self) -> String {
        let parts: Vec<&str> = self.name.split_whitespace().collect();
        if parts.len() >= 2 {
            let mut out = String::new();
            out.extend(parts[0].chars().next());
            out.extend(parts[1].chars().next());
            return out.to_uppercase();
        }
        if self.name.is_empty() {
            return "??".to_string();
        }
        self.name.chars().take(2).collect::<String>().to_uppercase()
    }

    /// Whole days since the lead entered its current stage.
    pub fn days_in_stage(&self) -> i64 {
        (Utc::now() - self.stage_changed_at).num_days().max(0)
    }

    /// Whole days the lead was (or has been) open. Closed leads measure up
    /// to their won/lost date; a closed lead missing its date reports 0.
    pub fn days_open(&self) -> i64 {
        let days = match self.status {
            LeadStatus::Open => (Utc::now() - self.created_at).num_days(),
            LeadStatus::Won => self
                .won_date
                .map(|d| (d - self.created_at).num_days())
                .unwrap_or(0),
            LeadStatus::Lost => self
                .lost_date
                .map(|d| (d - self.created_at).num_days())
                .unwrap_or(0),
        };
        days.max(0)
    }

    pub fn priority_color(&self) -> StageColor {
        match self.priority {
            Priority::Low => StageColor::Secondary,
            Priority::Medium => StageColor::Primary,
            Priority::High => StageColor::Warning,
            Priority::Urgent => StageColor::Danger,
        }
    }

    pub fn status_color(&self) -> StageColor {
        match self.status {
            LeadStatus::Open => StageColor::Primary,
            LeadStatus::Won => StageColor::Success,
            LeadStatus::Lost => StageColor::Danger,
        }
    }
}

impl TenantEntity for Lead {
    const ENTITY: &'static str = "lead";

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

/// Fields accepted when creating a lead. Omitted pipeline/stage fall back to
/// the hub defaults; omitted source falls back to the hub settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub value: Option<Decimal>,
    pub expected_close_date: Option<NaiveDate>,
    pub pipeline_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub source: Option<LeadSource>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

/// Editable lead fields. A changed `stage_id` routes through the stage-move
/// transition rather than a plain field update.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadPatch {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub value: Decimal,
    pub expected_close_date: Option<NaiveDate>,
    pub stage_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub source: LeadSource,
    pub priority: Priority,
    pub notes: Option<String>,
}

/// Filters for the lead list; all criteria are ANDed together.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub stage_id: Option<Uuid>,
    pub source: Option<LeadSource>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring match over name, email, phone and company.
    pub search: Option<String>,
}

impl LeadFilter {
    pub fn open() -> Self {
        Self {
            status: Some(LeadStatus::Open),
            ..Default::default()
        }
    }
}
