//! Lead entity and lifecycle: open leads move through stages until a
//! won/lost transition closes them. Stage moves and the status changes they
//! trigger land in a single storage commit.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::customers::CustomerRecord;
use crate::error::{CrmError, CrmResult};
use crate::models::{
    ActivityType, Lead, LeadActivity, LeadFilter, LeadPatch, LeadStatus, LossReason, NewLead,
    Pipeline, PipelineStage,
};
use crate::services::Crm;
use crate::store::{LeadStore, Repo};

/// Transition table for stage-driven status changes: entering a won stage
/// closes the lead as won, a lost stage as lost, anything else leaves the
/// status alone.
pub fn derive_status(stage: &PipelineStage) -> Option<LeadStatus> {
    if stage.is_won {
        Some(LeadStatus::Won)
    } else if stage.is_lost {
        Some(LeadStatus::Lost)
    } else {
        None
    }
}

/// Trimmed optional text; whitespace-only input collapses to `None`.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl<S: LeadStore> Crm<S> {
    /// Create a lead in `Open` status. Pipeline falls back to the hub
    /// default (bootstrapping it if needed), stage to the pipeline's first
    /// non-terminal stage, source to the hub settings.
    pub async fn create_lead(&self, hub_id: Uuid, new: NewLead) -> CrmResult<Lead> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("name is required"));
        }
        let value = new.value.unwrap_or(Decimal::ZERO);
        if value < Decimal::ZERO {
            return Err(CrmError::validation("value must not be negative"));
        }

        let pipeline = match new.pipeline_id {
            Some(id) => self.require::<Pipeline>(hub_id, id).await?,
            None => self.ensure_default_pipeline(hub_id).await?,
        };

        let stage = match new.stage_id {
            Some(id) => {
                let stage = self.require::<PipelineStage>(hub_id, id).await?;
                if stage.pipeline_id != pipeline.id {
                    return Err(CrmError::validation(
                        "stage does not belong to the selected pipeline",
                    ));
                }
                stage
            }
            None => self
                .store()
                .stages_of(hub_id, pipeline.id)
                .await?
                .into_iter()
                .find(|s| !s.is_terminal())
                .ok_or_else(|| CrmError::validation("no stages available in this pipeline"))?,
        };

        let source = match new.source {
            Some(source) => source,
            None => {
                self.store()
                    .get_or_create_settings(hub_id)
                    .await?
                    .default_source
            }
        };

        let mut lead = Lead::new(hub_id, name, pipeline.id, stage.id);
        lead.email = clean(new.email);
        lead.phone = clean(new.phone);
        lead.company = clean(new.company);
        lead.value = value;
        lead.expected_close_date = new.expected_close_date;
        lead.assigned_to = new.assigned_to;
        lead.customer_id = new.customer_id;
        lead.source = source;
        lead.priority = new.priority.unwrap_or_default();
        lead.notes = clean(new.notes);

        let lead = Repo::<Lead>::insert(self.store(), lead).await?;

        let created = LeadActivity::new(hub_id, lead.id, ActivityType::Note, "Lead created")
            .with_metadata(json!({ "source": lead.source }));
        Repo::<LeadActivity>::insert(self.store(), created).await?;

        Ok(lead)
    }

    pub async fn get_lead(&self, hub_id: Uuid, id: Uuid) -> CrmResult<Lead> {
        self.require::<Lead>(hub_id, id).await
    }

    pub async fn list_leads(&self, hub_id: Uuid, filter: &LeadFilter) -> CrmResult<Vec<Lead>> {
        Ok(self.store().list_leads(hub_id, filter).await?)
    }

    /// Edit the basic fields. A changed stage routes through
    /// [`Crm::move_to_stage`] so the transition (and any win/loss it
    /// triggers) is recorded normally.
    pub async fn update_lead(&self, hub_id: Uuid, id: Uuid, patch: LeadPatch) -> CrmResult<Lead> {
        let name = patch.name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("name is required"));
        }
        if patch.value < Decimal::ZERO {
            return Err(CrmError::validation("value must not be negative"));
        }

        let lead = self.require::<Lead>(hub_id, id).await?;
        let mut updated = lead.clone();
        updated.name = name.to_string();
        updated.email = clean(patch.email);
        updated.phone = clean(patch.phone);
        updated.company = clean(patch.company);
        updated.value = patch.value;
        updated.expected_close_date = patch.expected_close_date;
        updated.assigned_to = patch.assigned_to;
        updated.customer_id = patch.customer_id;
        updated.source = patch.source;
        updated.priority = patch.priority;
        updated.notes = clean(patch.notes);

        let mut committed = self.store().commit_lead(&updated, &[]).await?;
        if let Some(stage_id) = patch.stage_id {
            if stage_id != committed.stage_id {
                committed = self.move_to_stage(hub_id, id, stage_id).await?;
            }
        }
        Ok(committed)
    }

    pub async fn delete_lead(&self, hub_id: Uuid, id: Uuid) -> CrmResult<()> {
        self.require::<Lead>(hub_id, id).await?;
        Repo::<Lead>::soft_delete(self.store(), hub_id, id).await?;
        Ok(())
    }

    /// Move a lead to another stage of its pipeline. Entering a won/lost
    /// stage folds the matching status transition into the same commit, so
    /// one call can record both a stage change and a status change.
    pub async fn move_to_stage(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        stage_id: Uuid,
    ) -> CrmResult<Lead> {
        let lead = self.require::<Lead>(hub_id, lead_id).await?;
        if lead.stage_id == stage_id {
            return Ok(lead);
        }
        let stage = self.require::<PipelineStage>(hub_id, stage_id).await?;
        if stage.pipeline_id != lead.pipeline_id {
            return Err(CrmError::validation(
                "stage belongs to a different pipeline",
            ));
        }

        // The old stage can be gone if it was deleted after terminal leads
        // left it; the trail still records the move.
        let old_name = Repo::<PipelineStage>::find(self.store(), hub_id, lead.stage_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| "unknown".to_string());

        let mut updated = lead.clone();
        updated.stage_id = stage.id;
        updated.stage_changed_at = Utc::now();

        let mut activities = vec![LeadActivity::new(
            hub_id,
            lead.id,
            ActivityType::StageChange,
            format!("Stage changed from {} to {}", old_name, stage.name),
        )
        .with_metadata(json!({
            "old_stage": lead.stage_id,
            "old_stage_name": old_name,
            "new_stage": stage.id,
            "new_stage_name": stage.name,
        }))];

        let mut became_won = false;
        match derive_status(&stage) {
            Some(LeadStatus::Won) if updated.status != LeadStatus::Won => {
                apply_won(&mut updated);
                activities.push(won_activity(&updated));
                became_won = true;
            }
            Some(LeadStatus::Lost) if updated.status != LeadStatus::Lost => {
                apply_lost(&mut updated, None);
                activities.push(lost_activity(&updated, None));
            }
            _ => {}
        }

        let committed = self.store().commit_lead(&updated, &activities).await?;
        if became_won {
            return self.after_won(committed).await;
        }
        Ok(committed)
    }

    /// Close the lead as won. Already-won leads are left untouched, so
    /// repeated calls neither re-stamp the date nor duplicate the trail.
    pub async fn mark_won(&self, hub_id: Uuid, lead_id: Uuid) -> CrmResult<Lead> {
        let lead = self.require::<Lead>(hub_id, lead_id).await?;
        if lead.status == LeadStatus::Won {
            return Ok(lead);
        }

        let mut updated = lead;
        apply_won(&mut updated);
        let activity = won_activity(&updated);
        let committed = self.store().commit_lead(&updated, &[activity]).await?;
        self.after_won(committed).await
    }

    /// Close the lead as lost, optionally attaching a loss reason. An
    /// unknown reason id is treated as no reason. Idempotent like
    /// [`Crm::mark_won`].
    pub async fn mark_lost(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        loss_reason_id: Option<Uuid>,
    ) -> CrmResult<Lead> {
        let lead = self.require::<Lead>(hub_id, lead_id).await?;
        if lead.status == LeadStatus::Lost {
            return Ok(lead);
        }

        let reason = match loss_reason_id {
            Some(id) => Repo::<LossReason>::find(self.store(), hub_id, id).await?,
            None => None,
        };

        let mut updated = lead;
        apply_lost(&mut updated, reason.as_ref());
        let activity = lost_activity(&updated, reason.as_ref());
        Ok(self.store().commit_lead(&updated, &[activity]).await?)
    }

    /// Hand the lead to the customers module. Returns `None` without error
    /// when the module is absent or fails, or when the lead is already
    /// linked; winning a lead must never be blocked by conversion.
    pub async fn convert_to_customer(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
    ) -> CrmResult<Option<CustomerRecord>> {
        let lead = self.require::<Lead>(hub_id, lead_id).await?;
        if lead.customer_id.is_some() {
            log::warn!("lead {} already has a customer linked", lead.id);
            return Ok(None);
        }
        self.convert_now(&lead).await
    }

    async fn convert_now(&self, lead: &Lead) -> CrmResult<Option<CustomerRecord>> {
        let name = lead.company.as_deref().unwrap_or(&lead.name);
        let created = self
            .customers()
            .create_customer(lead.hub_id, name, lead.email.as_deref(), lead.phone.as_deref())
            .await;

        let customer = match created {
            Ok(customer) => customer,
            Err(err) => {
                log::warn!("customer conversion skipped for lead {}: {}", lead.id, err);
                return Ok(None);
            }
        };

        let mut updated = lead.clone();
        updated.customer_id = Some(customer.id);
        let note = LeadActivity::new(
            lead.hub_id,
            lead.id,
            ActivityType::Note,
            format!("Lead converted to customer: {}", customer.name),
        )
        .with_metadata(json!({ "customer_id": customer.id }));
        // The caller's transition has already committed at this point; a
        // failure storing the link must not make it look failed.
        if let Err(err) = self.store().commit_lead(&updated, &[note]).await {
            log::warn!("customer link for lead {} was not stored: {}", lead.id, err);
            return Ok(None);
        }

        Ok(Some(customer))
    }

    /// Post-win hook: auto-convert when the hub settings ask for it and the
    /// lead has no customer yet. Runs after the win has committed, so every
    /// failure here degrades to a warning.
    async fn after_won(&self, lead: Lead) -> CrmResult<Lead> {
        let settings = match self.store().get_or_create_settings(lead.hub_id).await {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("settings unavailable after win of lead {}: {}", lead.id, err);
                return Ok(lead);
            }
        };
        if settings.auto_create_customer_on_win && lead.customer_id.is_none() {
            if let Some(customer) = self.convert_now(&lead).await? {
                let mut lead = lead;
                lead.customer_id = Some(customer.id);
                return Ok(lead);
            }
        }
        Ok(lead)
    }
}

fn apply_won(lead: &mut Lead) {
    lead.status = LeadStatus::Won;
    lead.won_date = Some(Utc::now());
}

fn apply_lost(lead: &mut Lead, reason: Option<&LossReason>) {
    lead.status = LeadStatus::Lost;
    lead.lost_date = Some(Utc::now());
    lead.loss_reason_id = reason.map(|r| r.id);
}

fn won_activity(lead: &Lead) -> LeadActivity {
    LeadActivity::new(
        lead.hub_id,
        lead.id,
        ActivityType::StatusChange,
        "Lead marked as won",
    )
    .with_metadata(json!({ "new_status": "won" }))
}

fn lost_activity(lead: &Lead, reason: Option<&LossReason>) -> LeadActivity {
    let mut metadata = json!({ "new_status": "lost" });
    if let Some(reason) = reason {
        metadata["loss_reason"] = json!(reason.name);
    }
    LeadActivity::new(
        lead.hub_id,
        lead.id,
        ActivityType::StatusChange,
        "Lead marked as lost",
    )
    .with_metadata(metadata)
}
