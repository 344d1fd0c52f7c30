//! Domain operations over a [`LeadStore`]. One `Crm` value serves every hub;
//! each call is scoped by the `hub_id` the identity layer hands it.

pub mod activities;
pub mod leads;
pub mod pipelines;
pub mod settings;

use std::sync::Arc;

use uuid::Uuid;

use crate::customers::{CustomerService, NullCustomers};
use crate::error::{CrmError, CrmResult};
use crate::store::{LeadStore, Repo, TenantEntity};

pub use pipelines::{BoardColumn, PipelineBoard};

pub struct Crm<S> {
    store: S,
    customers: Arc<dyn CustomerService>,
}

impl<S: LeadStore> Crm<S> {
    /// CRM with no customers module configured; lead conversion is a no-op.
    pub fn new(store: S) -> Self {
        Self::with_customers(store, Arc::new(NullCustomers))
    }

    pub fn with_customers(store: S, customers: Arc<dyn CustomerService>) -> Self {
        Self { store, customers }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn customers(&self) -> &Arc<dyn CustomerService> {
        &self.customers
    }

    /// Resolve an id within the hub's non-deleted scope or fail with a typed
    /// not-found error.
    pub(crate) async fn require<E: TenantEntity>(&self, hub_id: Uuid, id: Uuid) -> CrmResult<E>
    where
        S: Repo<E>,
    {
        Repo::<E>::find(&self.store, hub_id, id)
            .await?
            .ok_or(CrmError::NotFound {
                entity: E::ENTITY,
                id,
            })
    }
}
