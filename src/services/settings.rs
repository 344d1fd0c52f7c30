//! Per-hub configuration and loss reasons. Every hub owns exactly one
//! settings row, created lazily on first read.

use uuid::Uuid;

use crate::error::{CrmError, CrmResult};
use crate::models::{LeadSettings, LossReason, Pipeline, SettingsPatch};
use crate::services::Crm;
use crate::store::{LeadStatusCounts, LeadStore, Repo};

impl<S: LeadStore> Crm<S> {
    pub async fn get_settings(&self, hub_id: Uuid) -> CrmResult<LeadSettings> {
        Ok(self.store().get_or_create_settings(hub_id).await?)
    }

    /// Apply a settings patch. A default pipeline must resolve within the
    /// hub before it can be stored.
    pub async fn update_settings(
        &self,
        hub_id: Uuid,
        patch: SettingsPatch,
    ) -> CrmResult<LeadSettings> {
        if let Some(pipeline_id) = patch.default_pipeline_id {
            self.require::<Pipeline>(hub_id, pipeline_id).await?;
        }

        let mut settings = self.store().get_or_create_settings(hub_id).await?;
        settings.default_pipeline_id = patch.default_pipeline_id;
        settings.auto_create_customer_on_win = patch.auto_create_customer_on_win;
        settings.default_source = patch.default_source;
        Ok(self.store().save_settings(settings).await?)
    }

    pub async fn list_loss_reasons(&self, hub_id: Uuid) -> CrmResult<Vec<LossReason>> {
        let mut reasons = Repo::<LossReason>::list(self.store(), hub_id).await?;
        reasons.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(reasons)
    }

    pub async fn add_loss_reason(
        &self,
        hub_id: Uuid,
        name: impl Into<String>,
    ) -> CrmResult<LossReason> {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("loss reason name is required"));
        }

        let existing = Repo::<LossReason>::list(self.store(), hub_id).await?;
        let mut reason = LossReason::new(hub_id, name);
        reason.sort_order = existing.iter().map(|r| r.sort_order).max().unwrap_or(0) + 10;
        Ok(Repo::<LossReason>::insert(self.store(), reason).await?)
    }

    /// Loss reasons are only ever soft-deleted; closed leads keep their
    /// reference.
    pub async fn delete_loss_reason(&self, hub_id: Uuid, id: Uuid) -> CrmResult<()> {
        self.require::<LossReason>(hub_id, id).await?;
        Repo::<LossReason>::soft_delete(self.store(), hub_id, id).await?;
        Ok(())
    }

    /// Hub-wide counts by status, for dashboards.
    pub async fn lead_stats(&self, hub_id: Uuid) -> CrmResult<LeadStatusCounts> {
        Ok(self.store().lead_status_counts(hub_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeadSource, NewLead};
    use crate::store::MemoryStore;

    fn crm() -> Crm<MemoryStore> {
        Crm::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn update_settings_rejects_foreign_default_pipeline() {
        let crm = crm();
        let hub = Uuid::new_v4();
        let other_hub = Uuid::new_v4();
        let foreign = crm.create_pipeline(other_hub, "Theirs", "").await.unwrap();

        let result = crm
            .update_settings(
                hub,
                SettingsPatch {
                    default_pipeline_id: Some(foreign.id),
                    auto_create_customer_on_win: false,
                    default_source: LeadSource::Manual,
                },
            )
            .await;
        assert!(matches!(result, Err(CrmError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_settings_round_trips() {
        let crm = crm();
        let hub = Uuid::new_v4();
        let pipeline = crm.create_pipeline(hub, "Sales", "").await.unwrap();

        let saved = crm
            .update_settings(
                hub,
                SettingsPatch {
                    default_pipeline_id: Some(pipeline.id),
                    auto_create_customer_on_win: true,
                    default_source: LeadSource::Website,
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.default_pipeline_id, Some(pipeline.id));

        let loaded = crm.get_settings(hub).await.unwrap();
        assert_eq!(loaded.id, saved.id);
        assert!(loaded.auto_create_customer_on_win);
        assert_eq!(loaded.default_source, LeadSource::Website);
    }

    #[tokio::test]
    async fn loss_reasons_sort_by_order_then_name() {
        let crm = crm();
        let hub = Uuid::new_v4();
        crm.add_loss_reason(hub, "Budget").await.unwrap();
        crm.add_loss_reason(hub, "Timing").await.unwrap();
        crm.add_loss_reason(hub, "Competitor").await.unwrap();

        let names: Vec<String> = crm
            .list_loss_reasons(hub)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Budget", "Timing", "Competitor"]);
    }

    #[tokio::test]
    async fn deleted_reason_survives_on_closed_leads() {
        let crm = crm();
        let hub = Uuid::new_v4();
        let reason = crm.add_loss_reason(hub, "Budget").await.unwrap();
        let lead = crm
            .create_lead(
                hub,
                NewLead {
                    name: "Acme".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        crm.mark_lost(hub, lead.id, Some(reason.id)).await.unwrap();

        crm.delete_loss_reason(hub, reason.id).await.unwrap();
        assert!(crm.list_loss_reasons(hub).await.unwrap().is_empty());
        let lead = crm.get_lead(hub, lead.id).await.unwrap();
        assert_eq!(lead.loss_reason_id, Some(reason.id));
    }

    #[tokio::test]
    async fn lead_stats_count_by_status() {
        let crm = crm();
        let hub = Uuid::new_v4();
        for name in ["A", "B", "C"] {
            crm.create_lead(
                hub,
                NewLead {
                    name: name.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        let leads = crm
            .list_leads(hub, &crate::models::LeadFilter::default())
            .await
            .unwrap();
        crm.mark_won(hub, leads[0].id).await.unwrap();
        crm.mark_lost(hub, leads[1].id, None).await.unwrap();

        let stats = crm.lead_stats(hub).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.won, 1);
        assert_eq!(stats.lost, 1);
    }
}
