//! Tenant-scoped persistence. Every read is implicitly restricted to
//! `hub_id = tenant AND is_deleted = false`; deletion is always a soft
//! flag-and-timestamp mutation.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Lead, LeadActivity, LeadFilter, LeadSettings, LeadStatus, LossReason, Pipeline, PipelineStage,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Common shape of every hub-scoped record.
pub trait TenantEntity: Clone + Send + Sync + 'static {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    fn id(&self) -> Uuid;
    fn hub_id(&self) -> Uuid;
    fn is_deleted(&self) -> bool;
    fn soft_delete(&mut self, at: DateTime<Utc>);
    fn touch(&mut self, at: DateTime<Utc>);
}

/// Tenant-scoped CRUD over one entity type.
#[async_trait]
pub trait Repo<E: TenantEntity>: Send + Sync {
    async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<E>, StoreError>;

    /// Default scope: non-deleted rows of this hub.
    async fn list(&self, hub_id: Uuid) -> Result<Vec<E>, StoreError>;

    /// The "all records" scope, deleted rows included.
    async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<E>, StoreError>;

    async fn insert(&self, row: E) -> Result<E, StoreError>;

    async fn update(&self, row: E) -> Result<E, StoreError>;

    /// Idempotent: deleting an already-deleted (or missing) row is a no-op.
    async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError>;
}

/// Scope for open-lead aggregates.
#[derive(Debug, Clone, Copy)]
pub enum LeadScope {
    Pipeline(Uuid),
    Stage(Uuid),
}

/// Open-lead count and summed value for a pipeline or stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeadTotals {
    pub count: i64,
    pub value: Decimal,
}

/// Non-deleted lead counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeadStatusCounts {
    pub total: i64,
    pub open: i64,
    pub won: i64,
    pub lost: i64,
}

/// Full storage contract for the leads module: per-entity CRUD plus the
/// operations that must be transactional or are cheaper done in the store.
#[async_trait]
pub trait LeadStore:
    Repo<Pipeline> + Repo<PipelineStage> + Repo<Lead> + Repo<LeadActivity> + Repo<LossReason>
{
    /// Persist a pipeline (insert or update). When `is_default` is set, the
    /// default flag is unset on every sibling in the same transaction.
    async fn save_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError>;

    /// Atomically persist a lead mutation together with the activity rows it
    /// produced. Either everything lands or nothing does.
    async fn commit_lead(
        &self,
        lead: &Lead,
        activities: &[LeadActivity],
    ) -> Result<Lead, StoreError>;

    /// Atomic insert-if-absent keyed by hub; never creates a second row.
    async fn get_or_create_settings(&self, hub_id: Uuid) -> Result<LeadSettings, StoreError>;

    async fn save_settings(&self, settings: LeadSettings) -> Result<LeadSettings, StoreError>;

    /// Non-deleted leads matching the filter, newest first.
    async fn list_leads(&self, hub_id: Uuid, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError>;

    /// Open leads of a stage ordered by value then recency, for board views.
    async fn leads_in_stage(&self, hub_id: Uuid, stage_id: Uuid) -> Result<Vec<Lead>, StoreError>;

    /// Count of non-deleted leads in a stage with the given status.
    async fn count_leads_in_stage(
        &self,
        hub_id: Uuid,
        stage_id: Uuid,
        status: LeadStatus,
    ) -> Result<i64, StoreError>;

    /// Count + summed value of open leads in a pipeline or stage. Always
    /// computed on demand; never cached.
    async fn open_lead_totals(
        &self,
        hub_id: Uuid,
        scope: LeadScope,
    ) -> Result<LeadTotals, StoreError>;

    async fn lead_status_counts(&self, hub_id: Uuid) -> Result<LeadStatusCounts, StoreError>;

    /// Non-deleted stages of a pipeline ordered by their sort key.
    async fn stages_of(
        &self,
        hub_id: Uuid,
        pipeline_id: Uuid,
    ) -> Result<Vec<PipelineStage>, StoreError>;

    /// Activity trail of a lead, newest first, capped at `limit`.
    async fn activities_of(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LeadActivity>, StoreError>;
}
