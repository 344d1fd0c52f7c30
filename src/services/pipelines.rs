//! Pipeline and stage registry: default-pipeline bootstrap, the
//! single-default invariant, stage management, and board/aggregate reads.

use uuid::Uuid;

use crate::error::{CrmError, CrmResult};
use crate::models::{Lead, LeadStatus, NewStage, Pipeline, PipelineStage, StageColor};
use crate::services::Crm;
use crate::store::{LeadScope, LeadStore, LeadTotals, Repo};

/// Stages seeded into a freshly bootstrapped pipeline.
const DEFAULT_STAGES: [(&str, i32, i32, StageColor, bool, bool); 7] = [
    ("New", 10, 10, StageColor::Info, false, false),
    ("Contacted", 20, 20, StageColor::Primary, false, false),
    ("Qualified", 30, 40, StageColor::Primary, false, false),
    ("Proposal", 40, 60, StageColor::Warning, false, false),
    ("Negotiation", 50, 80, StageColor::Warning, false, false),
    ("Won", 60, 100, StageColor::Success, true, false),
    ("Lost", 70, 0, StageColor::Danger, false, true),
];

/// One column of the Kanban board: a non-terminal stage and its open leads.
#[derive(Debug, Clone)]
pub struct BoardColumn {
    pub stage: PipelineStage,
    pub leads: Vec<Lead>,
    pub totals: LeadTotals,
}

#[derive(Debug, Clone)]
pub struct PipelineBoard {
    pub pipeline: Pipeline,
    pub columns: Vec<BoardColumn>,
}

impl<S: LeadStore> Crm<S> {
    /// Return the hub's first pipeline, bootstrapping the standard "Sales
    /// Pipeline" with its seven stages when the hub has none. Safe to call
    /// on every request; after the first call it only reads.
    pub async fn ensure_default_pipeline(&self, hub_id: Uuid) -> CrmResult<Pipeline> {
        if let Some(existing) = self.first_pipeline(hub_id).await? {
            return Ok(existing);
        }

        let mut pipeline = Pipeline::new(hub_id, "Sales Pipeline", "Default sales pipeline");
        pipeline.is_default = true;
        let pipeline = self.store().save_pipeline(pipeline).await?;

        for (name, order, probability, color, is_won, is_lost) in DEFAULT_STAGES {
            let mut stage = PipelineStage::new(hub_id, pipeline.id, name);
            stage.order = order;
            stage.probability = probability;
            stage.color = color;
            stage.is_won = is_won;
            stage.is_lost = is_lost;
            Repo::<PipelineStage>::insert(self.store(), stage).await?;
        }

        let mut settings = self.store().get_or_create_settings(hub_id).await?;
        settings.default_pipeline_id = Some(pipeline.id);
        self.store().save_settings(settings).await?;

        log::info!("bootstrapped default pipeline {} for hub {}", pipeline.id, hub_id);
        Ok(pipeline)
    }

    /// Non-deleted pipelines, default first, then by name.
    pub async fn list_pipelines(&self, hub_id: Uuid) -> CrmResult<Vec<Pipeline>> {
        let mut pipelines = Repo::<Pipeline>::list(self.store(), hub_id).await?;
        pipelines.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(pipelines)
    }

    pub async fn get_pipeline(&self, hub_id: Uuid, id: Uuid) -> CrmResult<Pipeline> {
        self.require::<Pipeline>(hub_id, id).await
    }

    pub async fn create_pipeline(
        &self,
        hub_id: Uuid,
        name: &str,
        description: &str,
    ) -> CrmResult<Pipeline> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("pipeline name is required"));
        }
        let pipeline = Pipeline::new(hub_id, name, description.trim());
        Ok(self.store().save_pipeline(pipeline).await?)
    }

    /// Persist a pipeline. Saving with `is_default` set unsets the flag on
    /// every sibling in the same transaction.
    pub async fn save_pipeline(&self, pipeline: Pipeline) -> CrmResult<Pipeline> {
        if pipeline.name.trim().is_empty() {
            return Err(CrmError::validation("pipeline name is required"));
        }
        Ok(self.store().save_pipeline(pipeline).await?)
    }

    /// Soft delete. Refused while open leads still sit in the pipeline.
    pub async fn delete_pipeline(&self, hub_id: Uuid, id: Uuid) -> CrmResult<()> {
        self.require::<Pipeline>(hub_id, id).await?;
        let totals = self
            .store()
            .open_lead_totals(hub_id, LeadScope::Pipeline(id))
            .await?;
        if totals.count > 0 {
            return Err(CrmError::Validation(format!(
                "cannot delete pipeline with {} active leads",
                totals.count
            )));
        }
        Repo::<Pipeline>::soft_delete(self.store(), hub_id, id).await?;
        Ok(())
    }

    /// Stages of a pipeline ordered by sort key.
    pub async fn list_stages(&self, hub_id: Uuid, pipeline_id: Uuid) -> CrmResult<Vec<PipelineStage>> {
        self.require::<Pipeline>(hub_id, pipeline_id).await?;
        Ok(self.store().stages_of(hub_id, pipeline_id).await?)
    }

    /// Append a stage; the new stage sorts after every existing one.
    pub async fn add_stage(
        &self,
        hub_id: Uuid,
        pipeline_id: Uuid,
        new: NewStage,
    ) -> CrmResult<PipelineStage> {
        let pipeline = self.require::<Pipeline>(hub_id, pipeline_id).await?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("stage name is required"));
        }
        if !(0..=100).contains(&new.probability) {
            return Err(CrmError::validation("probability must be between 0 and 100"));
        }
        if new.is_won && new.is_lost {
            return Err(CrmError::validation(
                "a stage cannot be both a won and a lost stage",
            ));
        }

        let max_order = self
            .store()
            .stages_of(hub_id, pipeline.id)
            .await?
            .iter()
            .map(|s| s.order)
            .max()
            .unwrap_or(0);

        let mut stage = PipelineStage::new(hub_id, pipeline.id, name);
        stage.order = max_order + 10;
        stage.probability = new.probability;
        stage.color = new.color.unwrap_or(StageColor::Primary);
        stage.is_won = new.is_won;
        stage.is_lost = new.is_lost;
        Ok(Repo::<PipelineStage>::insert(self.store(), stage).await?)
    }

    /// Soft delete. Refused while open leads still sit in the stage.
    pub async fn delete_stage(&self, hub_id: Uuid, id: Uuid) -> CrmResult<()> {
        self.require::<PipelineStage>(hub_id, id).await?;
        let open = self
            .store()
            .count_leads_in_stage(hub_id, id, LeadStatus::Open)
            .await?;
        if open > 0 {
            return Err(CrmError::Validation(format!(
                "cannot delete stage with {} active leads",
                open
            )));
        }
        Repo::<PipelineStage>::soft_delete(self.store(), hub_id, id).await?;
        Ok(())
    }

    /// Open-lead count and summed value for a pipeline. Computed on demand.
    pub async fn pipeline_totals(&self, hub_id: Uuid, pipeline_id: Uuid) -> CrmResult<LeadTotals> {
        self.require::<Pipeline>(hub_id, pipeline_id).await?;
        Ok(self
            .store()
            .open_lead_totals(hub_id, LeadScope::Pipeline(pipeline_id))
            .await?)
    }

    /// Open-lead count and summed value for a single stage.
    pub async fn stage_totals(&self, hub_id: Uuid, stage_id: Uuid) -> CrmResult<LeadTotals> {
        self.require::<PipelineStage>(hub_id, stage_id).await?;
        Ok(self
            .store()
            .open_lead_totals(hub_id, LeadScope::Stage(stage_id))
            .await?)
    }

    /// Kanban data: non-terminal stages of the chosen (or default) pipeline,
    /// each with its open leads ordered by value then recency.
    pub async fn pipeline_board(
        &self,
        hub_id: Uuid,
        pipeline_id: Option<Uuid>,
    ) -> CrmResult<PipelineBoard> {
        self.ensure_default_pipeline(hub_id).await?;

        let pipeline = match pipeline_id {
            Some(id) => self.require::<Pipeline>(hub_id, id).await?,
            None => {
                let pipelines = self.list_pipelines(hub_id).await?;
                match pipelines.into_iter().next() {
                    Some(p) => p,
                    // ensure_default_pipeline just ran; only a concurrent
                    // delete can leave the hub empty here.
                    None => return Err(CrmError::validation("no pipeline found")),
                }
            }
        };

        let mut columns = Vec::new();
        for stage in self
            .store()
            .stages_of(hub_id, pipeline.id)
            .await?
            .into_iter()
            .filter(|s| !s.is_terminal())
        {
            let leads = self.store().leads_in_stage(hub_id, stage.id).await?;
            let totals = self
                .store()
                .open_lead_totals(hub_id, LeadScope::Stage(stage.id))
                .await?;
            columns.push(BoardColumn {
                stage,
                leads,
                totals,
            });
        }

        Ok(PipelineBoard { pipeline, columns })
    }

    async fn first_pipeline(&self, hub_id: Uuid) -> CrmResult<Option<Pipeline>> {
        Ok(self.list_pipelines(hub_id).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLead;
    use crate::store::MemoryStore;

    fn crm() -> Crm<MemoryStore> {
        let _ = env_logger::builder().is_test(true).try_init();
        Crm::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn bootstrap_creates_standard_pipeline() {
        let crm = crm();
        let hub = Uuid::new_v4();

        let pipeline = crm.ensure_default_pipeline(hub).await.unwrap();
        assert_eq!(pipeline.name, "Sales Pipeline");
        assert!(pipeline.is_default);

        let stages = crm.list_stages(hub, pipeline.id).await.unwrap();
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["New", "Contacted", "Qualified", "Proposal", "Negotiation", "Won", "Lost"]
        );
        assert!(stages[5].is_won);
        assert!(stages[6].is_lost);
        assert_eq!(stages[5].probability, 100);

        let settings = crm.get_settings(hub).await.unwrap();
        assert_eq!(settings.default_pipeline_id, Some(pipeline.id));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let crm = crm();
        let hub = Uuid::new_v4();

        let first = crm.ensure_default_pipeline(hub).await.unwrap();
        let second = crm.ensure_default_pipeline(hub).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(crm.list_stages(hub, first.id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn exactly_one_default_pipeline_survives_any_save_sequence() {
        let crm = crm();
        let hub = Uuid::new_v4();
        crm.ensure_default_pipeline(hub).await.unwrap();

        let second = crm.create_pipeline(hub, "Enterprise", "").await.unwrap();
        let mut second = crm.get_pipeline(hub, second.id).await.unwrap();
        second.is_default = true;
        crm.save_pipeline(second.clone()).await.unwrap();

        let defaults: Vec<Pipeline> = crm
            .list_pipelines(hub)
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);

        // Flip back and check again.
        let mut original = crm.list_pipelines(hub).await.unwrap()[1].clone();
        original.is_default = true;
        crm.save_pipeline(original).await.unwrap();
        let defaults = crm
            .list_pipelines(hub)
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .count();
        assert_eq!(defaults, 1);
    }

    #[tokio::test]
    async fn stage_flags_cannot_both_be_set() {
        let crm = crm();
        let hub = Uuid::new_v4();
        let pipeline = crm.ensure_default_pipeline(hub).await.unwrap();

        let result = crm
            .add_stage(
                hub,
                pipeline.id,
                NewStage {
                    name: "Schrodinger".to_string(),
                    is_won: true,
                    is_lost: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(CrmError::Validation(_))));
    }

    #[tokio::test]
    async fn added_stage_sorts_last() {
        let crm = crm();
        let hub = Uuid::new_v4();
        let pipeline = crm.ensure_default_pipeline(hub).await.unwrap();

        let stage = crm
            .add_stage(
                hub,
                pipeline.id,
                NewStage {
                    name: "Legal review".to_string(),
                    probability: 90,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(stage.order, 80);
    }

    #[tokio::test]
    async fn stage_with_open_leads_cannot_be_deleted() {
        let crm = crm();
        let hub = Uuid::new_v4();
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

        let err = crm.delete_stage(hub, lead.stage_id).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));

        // Losing the lead clears the guard.
        crm.mark_lost(hub, lead.id, None).await.unwrap();
        crm.delete_stage(hub, lead.stage_id).await.unwrap();
    }

    #[tokio::test]
    async fn pipeline_with_open_leads_cannot_be_deleted() {
        let crm = crm();
        let hub = Uuid::new_v4();
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

        let err = crm.delete_pipeline(hub, lead.pipeline_id).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn board_skips_terminal_stages() {
        let crm = crm();
        let hub = Uuid::new_v4();
        crm.create_lead(
            hub,
            NewLead {
                name: "Acme".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let board = crm.pipeline_board(hub, None).await.unwrap();
        assert_eq!(board.columns.len(), 5);
        assert_eq!(board.columns[0].stage.name, "New");
        assert_eq!(board.columns[0].leads.len(), 1);
        assert_eq!(board.columns[0].totals.count, 1);
    }
}
