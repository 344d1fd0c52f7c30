//! Manual activity logging against a lead's trail.

use uuid::Uuid;

use crate::error::{CrmError, CrmResult};
use crate::models::{ActivityType, Lead, LeadActivity};
use crate::services::Crm;
use crate::store::{LeadStore, Repo};

const DEFAULT_TRAIL_LIMIT: i64 = 50;

impl<S: LeadStore> Crm<S> {
    /// Record a manual activity (note, call, email, meeting) on a lead.
    pub async fn add_activity(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        activity_type: ActivityType,
        description: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> CrmResult<LeadActivity> {
        let description = description.into();
        let description = description.trim();
        if description.is_empty() {
            return Err(CrmError::validation("description is required"));
        }
        self.require::<Lead>(hub_id, lead_id).await?;

        let mut activity = LeadActivity::new(hub_id, lead_id, activity_type, description);
        if let Some(metadata) = metadata {
            activity = activity.with_metadata(metadata);
        }
        Ok(Repo::<LeadActivity>::insert(self.store(), activity).await?)
    }

    /// Newest-first trail for a lead, capped at `limit` (default 50).
    pub async fn list_activities(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        limit: Option<i64>,
    ) -> CrmResult<Vec<LeadActivity>> {
        self.require::<Lead>(hub_id, lead_id).await?;
        Ok(self
            .store()
            .activities_of(hub_id, lead_id, limit.unwrap_or(DEFAULT_TRAIL_LIMIT))
            .await?)
    }
}
