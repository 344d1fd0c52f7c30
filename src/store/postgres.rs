//! Postgres store backend. Plain runtime-bound queries; the schema lives in
//! `migrations/`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::database::Database;
use crate::error::StoreError;
use crate::models::{
    Lead, LeadActivity, LeadFilter, LeadSettings, LeadStatus, LossReason, Pipeline, PipelineStage,
};
use crate::store::{LeadScope, LeadStatusCounts, LeadStore, LeadTotals, Repo};

#[derive(Clone)]
pub struct PgStore {
    pool: Database,
}

impl PgStore {
    pub fn new(pool: Database) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Database {
        &self.pool
    }
}

#[async_trait]
impl Repo<Pipeline> for PgStore {
    async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<Pipeline>, StoreError> {
        let row = sqlx::query_as::<_, Pipeline>(
            "SELECT * FROM pipelines WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE",
        )
        .bind(hub_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, hub_id: Uuid) -> Result<Vec<Pipeline>, StoreError> {
        let rows = sqlx::query_as::<_, Pipeline>(
            "SELECT * FROM pipelines WHERE hub_id = $1 AND is_deleted = FALSE ORDER BY created_at",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<Pipeline>, StoreError> {
        let rows = sqlx::query_as::<_, Pipeline>(
            "SELECT * FROM pipelines WHERE hub_id = $1 ORDER BY created_at",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, row: Pipeline) -> Result<Pipeline, StoreError> {
        let saved = sqlx::query_as::<_, Pipeline>(
            r#"
            INSERT INTO pipelines (
                id, hub_id, name, description, is_default, is_active,
                created_at, updated_at, is_deleted, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.hub_id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.is_default)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.is_deleted)
        .bind(row.deleted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn update(&self, row: Pipeline) -> Result<Pipeline, StoreError> {
        let saved = sqlx::query_as::<_, Pipeline>(
            r#"
            UPDATE pipelines SET
                name = $3, description = $4, is_default = $5, is_active = $6,
                updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(row.hub_id)
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.is_default)
        .bind(row.is_active)
        .fetch_optional(&self.pool)
        .await?;
        saved.ok_or(StoreError::RowNotFound)
    }

    async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE pipelines SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repo<PipelineStage> for PgStore {
    async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<PipelineStage>, StoreError> {
        let row = sqlx::query_as::<_, PipelineStage>(
            "SELECT * FROM pipeline_stages WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE",
        )
        .bind(hub_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, hub_id: Uuid) -> Result<Vec<PipelineStage>, StoreError> {
        let rows = sqlx::query_as::<_, PipelineStage>(
            r#"SELECT * FROM pipeline_stages WHERE hub_id = $1 AND is_deleted = FALSE ORDER BY "order""#,
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<PipelineStage>, StoreError> {
        let rows = sqlx::query_as::<_, PipelineStage>(
            r#"SELECT * FROM pipeline_stages WHERE hub_id = $1 ORDER BY "order""#,
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, row: PipelineStage) -> Result<PipelineStage, StoreError> {
        let saved = sqlx::query_as::<_, PipelineStage>(
            r#"
            INSERT INTO pipeline_stages (
                id, hub_id, pipeline_id, name, "order", probability, color,
                is_won, is_lost, created_at, updated_at, is_deleted, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.hub_id)
        .bind(row.pipeline_id)
        .bind(&row.name)
        .bind(row.order)
        .bind(row.probability)
        .bind(row.color)
        .bind(row.is_won)
        .bind(row.is_lost)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.is_deleted)
        .bind(row.deleted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn update(&self, row: PipelineStage) -> Result<PipelineStage, StoreError> {
        let saved = sqlx::query_as::<_, PipelineStage>(
            r#"
            UPDATE pipeline_stages SET
                name = $3, "order" = $4, probability = $5, color = $6,
                is_won = $7, is_lost = $8, updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(row.hub_id)
        .bind(row.id)
        .bind(&row.name)
        .bind(row.order)
        .bind(row.probability)
        .bind(row.color)
        .bind(row.is_won)
        .bind(row.is_lost)
        .fetch_optional(&self.pool)
        .await?;
        saved.ok_or(StoreError::RowNotFound)
    }

    async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE pipeline_stages SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repo<Lead> for PgStore {
    async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let row = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE",
        )
        .bind(hub_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, hub_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        let rows = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE hub_id = $1 AND is_deleted = FALSE ORDER BY created_at DESC",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        let rows = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE hub_id = $1 ORDER BY created_at DESC",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, row: Lead) -> Result<Lead, StoreError> {
        let saved = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (
                id, hub_id, name, email, phone, company, value, expected_close_date,
                pipeline_id, stage_id, assigned_to, customer_id, source, priority,
                notes, status, won_date, lost_date, loss_reason_id, stage_changed_at,
                created_at, updated_at, is_deleted, deleted_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.hub_id)
        .bind(&row.name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.company)
        .bind(row.value)
        .bind(row.expected_close_date)
        .bind(row.pipeline_id)
        .bind(row.stage_id)
        .bind(row.assigned_to)
        .bind(row.customer_id)
        .bind(row.source)
        .bind(row.priority)
        .bind(&row.notes)
        .bind(row.status)
        .bind(row.won_date)
        .bind(row.lost_date)
        .bind(row.loss_reason_id)
        .bind(row.stage_changed_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.is_deleted)
        .bind(row.deleted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn update(&self, row: Lead) -> Result<Lead, StoreError> {
        let saved = sqlx::query_as::<_, Lead>(UPDATE_LEAD_SQL)
            .bind(row.hub_id)
            .bind(row.id)
            .bind(&row.name)
            .bind(&row.email)
            .bind(&row.phone)
            .bind(&row.company)
            .bind(row.value)
            .bind(row.expected_close_date)
            .bind(row.stage_id)
            .bind(row.assigned_to)
            .bind(row.customer_id)
            .bind(row.source)
            .bind(row.priority)
            .bind(&row.notes)
            .bind(row.status)
            .bind(row.won_date)
            .bind(row.lost_date)
            .bind(row.loss_reason_id)
            .bind(row.stage_changed_at)
            .fetch_optional(&self.pool)
            .await?;
        saved.ok_or(StoreError::RowNotFound)
    }

    async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE leads SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const UPDATE_LEAD_SQL: &str = r#"
    UPDATE leads SET
        name = $3, email = $4, phone = $5, company = $6, value = $7,
        expected_close_date = $8, stage_id = $9, assigned_to = $10,
        customer_id = $11, source = $12, priority = $13, notes = $14,
        status = $15, won_date = $16, lost_date = $17, loss_reason_id = $18,
        stage_changed_at = $19, updated_at = NOW()
    WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
    RETURNING *
"#;

const INSERT_ACTIVITY_SQL: &str = r#"
    INSERT INTO lead_activities (
        id, hub_id, lead_id, activity_type, description, metadata,
        created_at, updated_at, is_deleted, deleted_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    RETURNING *
"#;

#[async_trait]
impl Repo<LeadActivity> for PgStore {
    async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<LeadActivity>, StoreError> {
        let row = sqlx::query_as::<_, LeadActivity>(
            "SELECT * FROM lead_activities WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE",
        )
        .bind(hub_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, hub_id: Uuid) -> Result<Vec<LeadActivity>, StoreError> {
        let rows = sqlx::query_as::<_, LeadActivity>(
            r#"
            SELECT * FROM lead_activities
            WHERE hub_id = $1 AND is_deleted = FALSE
            ORDER BY created_at DESC
            "#,
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<LeadActivity>, StoreError> {
        let rows = sqlx::query_as::<_, LeadActivity>(
            "SELECT * FROM lead_activities WHERE hub_id = $1 ORDER BY created_at DESC",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, row: LeadActivity) -> Result<LeadActivity, StoreError> {
        let saved = sqlx::query_as::<_, LeadActivity>(INSERT_ACTIVITY_SQL)
            .bind(row.id)
            .bind(row.hub_id)
            .bind(row.lead_id)
            .bind(row.activity_type)
            .bind(&row.description)
            .bind(&row.metadata)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(row.is_deleted)
            .bind(row.deleted_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }

    async fn update(&self, row: LeadActivity) -> Result<LeadActivity, StoreError> {
        // The trail is append-only; only the description of a manual note is
        // ever edited.
        let saved = sqlx::query_as::<_, LeadActivity>(
            r#"
            UPDATE lead_activities SET description = $3, updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(row.hub_id)
        .bind(row.id)
        .bind(&row.description)
        .fetch_optional(&self.pool)
        .await?;
        saved.ok_or(StoreError::RowNotFound)
    }

    async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE lead_activities SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repo<LossReason> for PgStore {
    async fn find(&self, hub_id: Uuid, id: Uuid) -> Result<Option<LossReason>, StoreError> {
        let row = sqlx::query_as::<_, LossReason>(
            "SELECT * FROM loss_reasons WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE",
        )
        .bind(hub_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, hub_id: Uuid) -> Result<Vec<LossReason>, StoreError> {
        let rows = sqlx::query_as::<_, LossReason>(
            r#"
            SELECT * FROM loss_reasons
            WHERE hub_id = $1 AND is_deleted = FALSE
            ORDER BY sort_order, name
            "#,
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_with_deleted(&self, hub_id: Uuid) -> Result<Vec<LossReason>, StoreError> {
        let rows = sqlx::query_as::<_, LossReason>(
            "SELECT * FROM loss_reasons WHERE hub_id = $1 ORDER BY sort_order, name",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, row: LossReason) -> Result<LossReason, StoreError> {
        let saved = sqlx::query_as::<_, LossReason>(
            r#"
            INSERT INTO loss_reasons (
                id, hub_id, name, is_active, sort_order,
                created_at, updated_at, is_deleted, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.hub_id)
        .bind(&row.name)
        .bind(row.is_active)
        .bind(row.sort_order)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.is_deleted)
        .bind(row.deleted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn update(&self, row: LossReason) -> Result<LossReason, StoreError> {
        let saved = sqlx::query_as::<_, LossReason>(
            r#"
            UPDATE loss_reasons SET
                name = $3, is_active = $4, sort_order = $5, updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(row.hub_id)
        .bind(row.id)
        .bind(&row.name)
        .bind(row.is_active)
        .bind(row.sort_order)
        .fetch_optional(&self.pool)
        .await?;
        saved.ok_or(StoreError::RowNotFound)
    }

    async fn soft_delete(&self, hub_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE loss_reasons SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE hub_id = $1 AND id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn save_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Single-default invariant: unset siblings inside the same
        // transaction as the save.
        if pipeline.is_default {
            sqlx::query(
                r#"
                UPDATE pipelines SET is_default = FALSE, updated_at = NOW()
                WHERE hub_id = $1 AND id <> $2 AND is_default = TRUE
                "#,
            )
            .bind(pipeline.hub_id)
            .bind(pipeline.id)
            .execute(&mut *tx)
            .await?;
        }

        let saved = sqlx::query_as::<_, Pipeline>(
            r#"
            INSERT INTO pipelines (
                id, hub_id, name, description, is_default, is_active,
                created_at, updated_at, is_deleted, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, description = EXCLUDED.description,
                is_default = EXCLUDED.is_default, is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(pipeline.id)
        .bind(pipeline.hub_id)
        .bind(&pipeline.name)
        .bind(&pipeline.description)
        .bind(pipeline.is_default)
        .bind(pipeline.is_active)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .bind(pipeline.is_deleted)
        .bind(pipeline.deleted_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn commit_lead(
        &self,
        lead: &Lead,
        activities: &[LeadActivity],
    ) -> Result<Lead, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Lead>(UPDATE_LEAD_SQL)
            .bind(lead.hub_id)
            .bind(lead.id)
            .bind(&lead.name)
            .bind(&lead.email)
            .bind(&lead.phone)
            .bind(&lead.company)
            .bind(lead.value)
            .bind(lead.expected_close_date)
            .bind(lead.stage_id)
            .bind(lead.assigned_to)
            .bind(lead.customer_id)
            .bind(lead.source)
            .bind(lead.priority)
            .bind(&lead.notes)
            .bind(lead.status)
            .bind(lead.won_date)
            .bind(lead.lost_date)
            .bind(lead.loss_reason_id)
            .bind(lead.stage_changed_at)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::RowNotFound)?;

        for activity in activities {
            sqlx::query(INSERT_ACTIVITY_SQL)
                .bind(activity.id)
                .bind(activity.hub_id)
                .bind(activity.lead_id)
                .bind(activity.activity_type)
                .bind(&activity.description)
                .bind(&activity.metadata)
                .bind(activity.created_at)
                .bind(activity.updated_at)
                .bind(activity.is_deleted)
                .bind(activity.deleted_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn get_or_create_settings(&self, hub_id: Uuid) -> Result<LeadSettings, StoreError> {
        // Insert-if-absent backed by the unique index on hub_id; concurrent
        // first calls race harmlessly into the same row.
        sqlx::query("INSERT INTO lead_settings (id, hub_id) VALUES ($1, $2) ON CONFLICT (hub_id) DO NOTHING")
            .bind(Uuid::new_v4())
            .bind(hub_id)
            .execute(&self.pool)
            .await?;

        let settings = sqlx::query_as::<_, LeadSettings>(
            "SELECT * FROM lead_settings WHERE hub_id = $1",
        )
        .bind(hub_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(settings)
    }

    async fn save_settings(&self, settings: LeadSettings) -> Result<LeadSettings, StoreError> {
        let saved = sqlx::query_as::<_, LeadSettings>(
            r#"
            INSERT INTO lead_settings (
                id, hub_id, default_pipeline_id, auto_create_customer_on_win,
                default_source, created_at, updated_at, is_deleted, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (hub_id) DO UPDATE SET
                default_pipeline_id = EXCLUDED.default_pipeline_id,
                auto_create_customer_on_win = EXCLUDED.auto_create_customer_on_win,
                default_source = EXCLUDED.default_source,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(settings.id)
        .bind(settings.hub_id)
        .bind(settings.default_pipeline_id)
        .bind(settings.auto_create_customer_on_win)
        .bind(settings.default_source)
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .bind(settings.is_deleted)
        .bind(settings.deleted_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn list_leads(&self, hub_id: Uuid, filter: &LeadFilter) -> Result<Vec<Lead>, StoreError> {
        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT * FROM leads WHERE hub_id = ");
        qb.push_bind(hub_id);
        qb.push(" AND is_deleted = FALSE");
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        if let Some(stage_id) = filter.stage_id {
            qb.push(" AND stage_id = ");
            qb.push_bind(stage_id);
        }
        if let Some(source) = filter.source {
            qb.push(" AND source = ");
            qb.push_bind(source);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ");
            qb.push_bind(priority);
        }
        if let Some(q) = &filter.search {
            let pattern = format!("%{}%", q);
            qb.push(" AND (name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR email ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR phone ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR company ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
        qb.push(" ORDER BY created_at DESC");

        let rows = qb.build_query_as::<Lead>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn leads_in_stage(&self, hub_id: Uuid, stage_id: Uuid) -> Result<Vec<Lead>, StoreError> {
        let rows = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE hub_id = $1 AND stage_id = $2 AND status = 'open' AND is_deleted = FALSE
            ORDER BY value DESC, created_at DESC
            "#,
        )
        .bind(hub_id)
        .bind(stage_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_leads_in_stage(
        &self,
        hub_id: Uuid,
        stage_id: Uuid,
        status: LeadStatus,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM leads
            WHERE hub_id = $1 AND stage_id = $2 AND status = $3 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .bind(stage_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn open_lead_totals(
        &self,
        hub_id: Uuid,
        scope: LeadScope,
    ) -> Result<LeadTotals, StoreError> {
        let sql = match scope {
            LeadScope::Pipeline(_) => {
                r#"
                SELECT COUNT(*), COALESCE(SUM(value), 0) FROM leads
                WHERE hub_id = $1 AND pipeline_id = $2 AND status = 'open' AND is_deleted = FALSE
                "#
            }
            LeadScope::Stage(_) => {
                r#"
                SELECT COUNT(*), COALESCE(SUM(value), 0) FROM leads
                WHERE hub_id = $1 AND stage_id = $2 AND status = 'open' AND is_deleted = FALSE
                "#
            }
        };
        let target = match scope {
            LeadScope::Pipeline(id) | LeadScope::Stage(id) => id,
        };
        let (count, value): (i64, Decimal) = sqlx::query_as(sql)
            .bind(hub_id)
            .bind(target)
            .fetch_one(&self.pool)
            .await?;
        Ok(LeadTotals { count, value })
    }

    async fn lead_status_counts(&self, hub_id: Uuid) -> Result<LeadStatusCounts, StoreError> {
        let (total, open, won, lost): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'open'),
                COUNT(*) FILTER (WHERE status = 'won'),
                COUNT(*) FILTER (WHERE status = 'lost')
            FROM leads
            WHERE hub_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(hub_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(LeadStatusCounts {
            total,
            open,
            won,
            lost,
        })
    }

    async fn stages_of(
        &self,
        hub_id: Uuid,
        pipeline_id: Uuid,
    ) -> Result<Vec<PipelineStage>, StoreError> {
        let rows = sqlx::query_as::<_, PipelineStage>(
            r#"
            SELECT * FROM pipeline_stages
            WHERE hub_id = $1 AND pipeline_id = $2 AND is_deleted = FALSE
            ORDER BY "order", created_at
            "#,
        )
        .bind(hub_id)
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn activities_of(
        &self,
        hub_id: Uuid,
        lead_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LeadActivity>, StoreError> {
        let rows = sqlx::query_as::<_, LeadActivity>(
            r#"
            SELECT * FROM lead_activities
            WHERE hub_id = $1 AND lead_id = $2 AND is_deleted = FALSE
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(hub_id)
        .bind(lead_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
