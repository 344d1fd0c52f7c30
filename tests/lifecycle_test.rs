//! End-to-end lifecycle scenarios against the in-memory backend, driven
//! entirely through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use leadflow::customers::{CustomerError, CustomerRecord, CustomerService};
use leadflow::models::{
    ActivityType, LeadFilter, LeadSource, LeadStatus, NewLead, PipelineStage, SettingsPatch,
};
use leadflow::store::MemoryStore;
use leadflow::Crm;

/// Collaborator double that fulfils every request and counts them.
struct RecordingCustomers {
    calls: AtomicUsize,
}

impl RecordingCustomers {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CustomerService for RecordingCustomers {
    async fn create_customer(
        &self,
        hub_id: Uuid,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<CustomerRecord, CustomerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CustomerRecord {
            id: Uuid::new_v4(),
            hub_id,
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
        })
    }
}

/// Collaborator double that always fails.
struct BrokenCustomers;

#[async_trait]
impl CustomerService for BrokenCustomers {
    async fn create_customer(
        &self,
        _hub_id: Uuid,
        _name: &str,
        _email: Option<&str>,
        _phone: Option<&str>,
    ) -> Result<CustomerRecord, CustomerError> {
        Err(CustomerError::Failed("connection refused".to_string()))
    }
}

async fn stage_named(crm: &Crm<MemoryStore>, hub: Uuid, pipeline: Uuid, name: &str) -> PipelineStage {
    crm.list_stages(hub, pipeline)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap()
}

#[tokio::test]
async fn lead_walks_the_pipeline_to_won() {
    let crm = Crm::new(MemoryStore::new());
    let hub = Uuid::new_v4();

    let lead = crm
        .create_lead(
            hub,
            NewLead {
                name: "Acme Corp".to_string(),
                company: Some("Acme Corp".to_string()),
                value: Some(Decimal::new(12_000, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    for name in ["Contacted", "Qualified", "Proposal", "Negotiation"] {
        let stage = stage_named(&crm, hub, lead.pipeline_id, name).await;
        let moved = crm.move_to_stage(hub, lead.id, stage.id).await.unwrap();
        assert_eq!(moved.status, LeadStatus::Open);
        assert_eq!(moved.stage_id, stage.id);
    }

    let won_stage = stage_named(&crm, hub, lead.pipeline_id, "Won").await;
    let won = crm.move_to_stage(hub, lead.id, won_stage.id).await.unwrap();
    assert_eq!(won.status, LeadStatus::Won);
    assert!(won.won_date.is_some());

    // One creation note, five stage moves, one status change.
    let trail = crm.list_activities(hub, lead.id, None).await.unwrap();
    assert_eq!(trail.len(), 7);
    assert_eq!(
        trail
            .iter()
            .filter(|a| a.activity_type == ActivityType::StageChange)
            .count(),
        5
    );

    let stats = crm.lead_stats(hub).await.unwrap();
    assert_eq!(stats.won, 1);
    assert_eq!(stats.open, 0);
}

#[tokio::test]
async fn winning_auto_creates_a_customer_when_configured() {
    let customers = RecordingCustomers::new();
    let crm = Crm::with_customers(MemoryStore::new(), customers.clone());
    let hub = Uuid::new_v4();

    let pipeline = crm.ensure_default_pipeline(hub).await.unwrap();
    crm.update_settings(
        hub,
        SettingsPatch {
            default_pipeline_id: Some(pipeline.id),
            auto_create_customer_on_win: true,
            default_source: LeadSource::Manual,
        },
    )
    .await
    .unwrap();

    let lead = crm
        .create_lead(
            hub,
            NewLead {
                name: "Jane Doe".to_string(),
                company: Some("Globex".to_string()),
                email: Some("jane@globex.example".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let won = crm.mark_won(hub, lead.id).await.unwrap();
    assert_eq!(won.status, LeadStatus::Won);
    assert!(won.customer_id.is_some());
    assert_eq!(customers.calls(), 1);

    // Company name wins over the contact name, and the conversion is logged.
    let trail = crm.list_activities(hub, lead.id, None).await.unwrap();
    let note = trail
        .iter()
        .find(|a| a.description.starts_with("Lead converted"))
        .unwrap();
    assert_eq!(note.description, "Lead converted to customer: Globex");

    // A second explicit conversion is refused without error.
    let again = crm.convert_to_customer(hub, lead.id).await.unwrap();
    assert!(again.is_none());
    assert_eq!(customers.calls(), 1);
}

#[tokio::test]
async fn broken_customers_module_never_blocks_a_win() {
    let crm = Crm::with_customers(MemoryStore::new(), Arc::new(BrokenCustomers));
    let hub = Uuid::new_v4();

    let pipeline = crm.ensure_default_pipeline(hub).await.unwrap();
    crm.update_settings(
        hub,
        SettingsPatch {
            default_pipeline_id: Some(pipeline.id),
            auto_create_customer_on_win: true,
            default_source: LeadSource::Manual,
        },
    )
    .await
    .unwrap();

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

    let won = crm.mark_won(hub, lead.id).await.unwrap();
    assert_eq!(won.status, LeadStatus::Won);
    assert_eq!(won.customer_id, None);
}

#[tokio::test]
async fn failed_commit_leaves_no_partial_lifecycle_state() {
    let crm = Crm::new(MemoryStore::new());
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
    let lost_stage = stage_named(&crm, hub, lead.pipeline_id, "Lost").await;

    crm.store().fail_commits(true);
    assert!(crm.move_to_stage(hub, lead.id, lost_stage.id).await.is_err());
    crm.store().fail_commits(false);

    let unchanged = crm.get_lead(hub, lead.id).await.unwrap();
    assert_eq!(unchanged.status, LeadStatus::Open);
    assert_eq!(unchanged.stage_id, lead.stage_id);
    assert_eq!(unchanged.lost_date, None);

    // The move goes through cleanly once commits succeed again.
    let lost = crm.move_to_stage(hub, lead.id, lost_stage.id).await.unwrap();
    assert_eq!(lost.status, LeadStatus::Lost);
}

#[tokio::test]
async fn board_reflects_open_leads_per_stage() {
    let crm = Crm::new(MemoryStore::new());
    let hub = Uuid::new_v4();

    let first = crm
        .create_lead(
            hub,
            NewLead {
                name: "Acme".to_string(),
                value: Some(Decimal::new(5_000, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    crm.create_lead(
        hub,
        NewLead {
            name: "Globex".to_string(),
            value: Some(Decimal::new(3_000, 0)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    crm.mark_won(hub, first.id).await.unwrap();

    let board = crm.pipeline_board(hub, None).await.unwrap();
    // Terminal stages never appear as columns.
    assert!(board.columns.iter().all(|c| !c.stage.is_terminal()));

    let new_column = board
        .columns
        .iter()
        .find(|c| c.stage.name == "New")
        .unwrap();
    assert_eq!(new_column.leads.len(), 1);
    assert_eq!(new_column.totals.count, 1);
    assert_eq!(new_column.totals.value, Decimal::new(3_000, 0));

    let open = crm.list_leads(hub, &LeadFilter::open()).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].name, "Globex");
}
