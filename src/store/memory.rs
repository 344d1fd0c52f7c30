//! In-process store backend. Backs the test suite and small embedded
//! deployments; a single mutex around the tables gives the same atomicity
//! the Postgres backend gets from transactions.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Lead, LeadActivity, LeadFilter, LeadSettings, LeadStatus, LossReason, Pipeline, PipelineStage,
};
use crate::store::{
    LeadScope, LeadStatusCounts, LeadStore, LeadTotals, Repo, TenantEntity,
};

#[derive(Default)]
struct Tables {
    pipelines: Vec<Pipeline>,
    stages: Vec<PipelineStage>,
    leads: Vec<Lead>,
    activities: Vec<LeadActivity>,
    loss_reasons: Vec<LossReason>,
    settings: Vec<LeadSettings>,
}

pub struct MemoryStore {
    inner: Mutex<Tables>,
    // Remaining `commit_lead` calls before injected failure; -1 = unlimited.
    commit_budget: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Mutex::default(),
            commit_budget: AtomicI64::new(-1),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `commit_lead` calls fail before writing anything.
    /// Lets callers exercise the all-or-nothing contract of lifecycle
    /// transitions without a real storage fault.
    pub fn fail_commits(&self, fail: bool) {
        self.commit_budget
            .store(if fail { 0 } else { -1 }, Ordering::SeqCst);
    }

    /// Let the next `n` commits through, then fail, for exercising
    /// multi-commit operations that fault partway.
    pub fn fail_commits_after(&self, n: i64) {
        self.commit_budget.store(n, Ordering::SeqCst);
    }

    fn take_commit_budget(&self) -> Result<(), StoreError> {
        let remaining = self.commit_budget.load(Ordering::SeqCst);
        if remaining < 0 {
            return Ok(());
        }
        if remaining == 0 {
            return Err(StoreError::Backend("commit rejected".to_string()));
        }
        self.commit_budget.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

macro_rules! memory_repo {
    ($entity:ty, $table:ident) => {
        #[async_trait]
        impl Repo<$entity> for MemoryStore {
            async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<$entity>, StoreError> {
                let inner = self.inner.lock().await;
                Ok(inner
                    .$table
                    .iter()
                    .find(|r| r.hub_id() == hub_id && r.id() == id && !r.is_deleted())
                    .cloned())
            }

            async fn list(&self, hub_id: Uuid) -> Result<Vec<$entity>, StoreError> {
                let inner = self.inner.lock().await;
                Ok(inner
                    .$table
                    .iter()
                    .filter(|r| r.hub_id() == hub_id && !r.is_deleted())
                    .cloned()
                    .collect())
            }

            async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<$entity>, StoreError> {
                let inner = self.inner.lock().await;
                Ok(inner
                    .$table
                    .iter()
                    .filter(|r| r.hub_id() == hub_id)
                    .cloned()
                    .collect())
            }

            async fn insert(&self, row: $entity) -> Result<$entity, StoreError> {
                let mut inner = self.inner.lock().await;
                if inner.$table.iter().any(|r| r.id() == row.id()) {
                    return Err(StoreError::Conflict(format!("duplicate id {}", row.id())));
                }
                inner.$table.push(row.clone());
                Ok(row)
            }

            async fn update(&self, mut row: $entity) -> Result<$entity, StoreError> {
                row.touch(Utc::now());
                let mut inner = self.inner.lock().await;
                match inner
                    .$table
                    .iter_mut()
                    .find(|r| r.hub_id() == row.hub_id() && r.id() == row.id() && !r.is_deleted())
                {
                    Some(slot) => {
                        *slot = row.clone();
                        Ok(row)
                    }
                    None => Err(StoreError::RowNotFound),
                }
            }

            async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError> {
                let mut inner = self.inner.lock().await;
                if let Some(row) = inner
                    .$table
                    .iter_mut()
                    .find(|r| r.hub_id() == hub_id && r.id() == id && !r.is_deleted())
                {
                    row.soft_delete(Utc::now());
                }
                Ok(())
            }
        }
    };
}

memory_repo!(Pipeline, pipelines);
memory_repo!(PipelineStage, stages);
memory_repo!(Lead, leads);
memory_repo!(LeadActivity, activities);
memory_repo!(LossReason, loss_reasons);

fn matches_filter(lead: &Lead, filter: &LeadFilter) -> bool {
    if let Some(status) = filter.status {
        if lead.status != status {
            return false;
        }
    }
    if let Some(stage_id) = filter.stage_id {
        if lead.stage_id != stage_id {
            return false;
        }
    }
    if let Some(source) = filter.source {
        if lead.source != source {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if lead.priority != priority {
            return false;
        }
    }
    if let Some(q) = &filter.search {
        let q = q.to_lowercase();
        let hit = lead.name.to_lowercase().contains(&q)
            || lead
                .email
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&q))
            || lead
                .phone
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&q))
            || lead
                .company
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&q));
        if !hit {
            return false;
        }
    }
    true
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn save_pipeline(&self, mut pipeline: Pipeline) -> Result<Pipeline, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        if pipeline.is_default {
            for other in inner
                .pipelines
                .iter_mut()
                .filter(|p| p.hub_id == pipeline.hub_id && p.id != pipeline.id && p.is_default)
            {
                other.is_default = false;
                other.updated_at = now;
            }
        }
        match inner.pipelines.iter_mut().find(|p| p.id == pipeline.id) {
            Some(slot) => {
                pipeline.updated_at = now;
                *slot = pipeline.clone();
            }
            None => inner.pipelines.push(pipeline.clone()),
        }
        Ok(pipeline)
    }

    async fn commit_lead(
        &self,
        lead: &Lead,
        activities: &[LeadActivity],
    ) -> Result<Lead, StoreError> {
        self.take_commit_budget()?;
        let mut inner = self.inner.lock().await;
        let slot = inner
            .leads
            .iter_mut()
            .find(|l| l.hub_id == lead.hub_id && l.id == lead.id && !l.is_deleted)
            .ok_or(StoreError::RowNotFound)?;
        let mut updated = lead.clone();
        updated.updated_at = Utc::now();
        *slot = updated.clone();
        inner.activities.extend_from_slice(activities);
        Ok(updated)
    }

    async fn get_or_create_settings(&self, hub_id: Uuid) -> Result<LeadSettings, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .settings
            .iter()
            .find(|s| s.hub_id == hub_id && !s.is_deleted)
        {
            return Ok(existing.clone());
        }
        let created = LeadSettings::new(hub_id);
        inner.settings.push(created.clone());
        Ok(created)
    }

    async fn save_settings(&self, mut settings: LeadSettings) -> Result<LeadSettings, StoreError> {
        let mut inner = self.inner.lock().await;
        settings.updated_at = Utc::now();
        match inner
            .settings
            .iter_mut()
            .find(|s| s.hub_id == settings.hub_id)
        {
            Some(slot) => *slot = settings.clone(),
            None => inner.settings.push(settings.clone()),
        }
        Ok(settings)
    }

    async fn list_leads(&self, hub_id: Uuid, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError> {
        let inner = self.inner.lock().await;
        let mut leads: Vec<Lead> = inner
            .leads
            .iter()
            .filter(|l| l.hub_id == hub_id && !l.is_deleted && matches_filter(l, filter))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn leads_in_stage(&self, hub_id: Uuid, stage_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        let inner = self.inner.lock().await;
        let mut leads: Vec<Lead> = inner
            .leads
            .iter()
            .filter(|l| {
                l.hub_id == hub_id
                    && l.stage_id == stage_id
                    && l.status == LeadStatus::Open
                    && !l.is_deleted
            })
            .cloned()
            .collect();
        leads.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(leads)
    }

    async fn count_leads_in_stage(
        &self,
        hub_id: Uuid,
        stage_id: Uuid,
        status: LeadStatus,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .leads
            .iter()
            .filter(|l| {
                l.hub_id == hub_id && l.stage_id == stage_id && l.status == status && !l.is_deleted
            })
            .count() as i64)
    }

    async fn open_lead_totals(
        &self,
        hub_id: Uuid,
        scope: LeadScope,
    ) -> Result<LeadTotals, StoreError> {
        let inner = self.inner.lock().await;
        let mut totals = LeadTotals::default();
        for lead in inner.leads.iter().filter(|l| {
            l.hub_id == hub_id
                && l.status == LeadStatus::Open
                && !l.is_deleted
                && match scope {
                    LeadScope::Pipeline(id) => l.pipeline_id == id,
                    LeadScope::Stage(id) => l.stage_id == id,
                }
        }) {
            totals.count += 1;
            totals.value += lead.value;
        }
        Ok(totals)
    }

    async fn lead_status_counts(&self, hub_id: Uuid) -> Result<LeadStatusCounts, StoreError> {
        let inner = self.inner.lock().await;
        let mut counts = LeadStatusCounts::default();
        for lead in inner
            .leads
            .iter()
            .filter(|l| l.hub_id == hub_id && !l.is_deleted)
        {
            counts.total += 1;
            match lead.status {
                LeadStatus::Open => counts.open += 1,
                LeadStatus::Won => counts.won += 1,
                LeadStatus::Lost => counts.lost += 1,
            }
        }
        Ok(counts)
    }

    async fn stages_of(
        &self,
        hub_id: Uuid,
        pipeline_id: Uuid,
    ) -> Result<Vec<PipelineStage>, StoreError> {
        let inner = self.inner.lock().await;
        let mut stages: Vec<PipelineStage> = inner
            .stages
            .iter()
            .filter(|s| s.hub_id == hub_id && s.pipeline_id == pipeline_id && !s.is_deleted)
            .cloned()
            .collect();
        stages.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(stages)
    }

    async fn activities_of(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LeadActivity>, StoreError> {
        let inner = self.inner.lock().await;
        // Reverse insertion order first so timestamp ties still come out
        // newest-first under the stable sort.
        let mut activities: Vec<LeadActivity> = inner
            .activities
            .iter()
            .rev()
            .filter(|a| a.hub_id == hub_id && a.lead_id == lead_id && !a.is_deleted)
            .cloned()
            .collect();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.truncate(limit.max(0) as usize);
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn soft_delete_hides_from_default_scope() {
        let store = MemoryStore::new();
        let hub = Uuid::new_v4();
        let pipeline = Pipeline::new(hub, "Sales Pipeline", "");
        let id = pipeline.id;
        Repo::<Pipeline>::insert(&store, pipeline).await.unwrap();

        Repo::<Pipeline>::soft_delete(&store, hub, id).await.unwrap();
        let visible = Repo::<Pipeline>::list(&store, hub).await.unwrap();
        assert!(visible.is_empty());

        let all = Repo::<Pipeline>::list_with_deleted(&store, hub).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted);
        assert!(all[0].deleted_at.is_some());

        // Idempotent: the second delete keeps the original timestamp.
        let first_deleted_at = all[0].deleted_at;
        Repo::<Pipeline>::soft_delete(&store, hub, id).await.unwrap();
        let all = Repo::<Pipeline>::list_with_deleted(&store, hub).await.unwrap();
        assert_eq!(all[0].deleted_at, first_deleted_at);
    }

    #[tokio::test]
    async fn update_refuses_soft_deleted_rows() {
        let store = MemoryStore::new();
        let hub = Uuid::new_v4();
        let pipeline = Pipeline::new(hub, "Sales", "");
        let id = pipeline.id;
        Repo::<Pipeline>::insert(&store, pipeline.clone()).await.unwrap();

        let mut renamed = pipeline.clone();
        renamed.name = "Renamed".to_string();
        let saved = Repo::<Pipeline>::update(&store, renamed.clone()).await.unwrap();
        assert_eq!(saved.name, "Renamed");

        Repo::<Pipeline>::soft_delete(&store, hub, id).await.unwrap();
        renamed.name = "Ghost edit".to_string();
        let result = Repo::<Pipeline>::update(&store, renamed).await;
        assert!(matches!(result, Err(StoreError::RowNotFound)));

        // The deleted row keeps the last live state.
        let all = Repo::<Pipeline>::list_with_deleted(&store, hub).await.unwrap();
        assert_eq!(all[0].name, "Renamed");
    }

    #[tokio::test]
    async fn no_cross_hub_visibility() {
        let store = MemoryStore::new();
        let hub_a = Uuid::new_v4();
        let hub_b = Uuid::new_v4();
        Repo::<Pipeline>::insert(&store, Pipeline::new(hub_a, "A", ""))
            .await
            .unwrap();

        assert!(Repo::<Pipeline>::list(&store, hub_b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_get_or_create_is_single_row() {
        let store = MemoryStore::new();
        let hub = Uuid::new_v4();
        let first = store.get_or_create_settings(hub).await.unwrap();
        let second = store.get_or_create_settings(hub).await.unwrap();
        assert_eq!(first.id, second.id);
    }
}
