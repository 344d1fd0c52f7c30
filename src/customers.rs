//! Capability interface for the external customers module. The module may
//! not be installed at all; callers inject [`NullCustomers`] in that case
//! and lead conversion degrades to a no-op.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Minimal view of a customer record returned by the collaborator.
#[derive(Debug, Clone)]
pub struct CustomerRecord {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("customers module is not available")]
    Unavailable,

    #[error("customer creation failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait CustomerService: Send + Sync {
    async fn create_customer(
        &self,
        hub_id: Uuid,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<CustomerRecord, CustomerError>;
}

/// Null object used when no customers module is configured.
pub struct NullCustomers;

#[async_trait]
impl CustomerService for NullCustomers {
    async fn create_customer(
        &self,
        _hub_id: Uuid,
        _name: &str,
        _email: Option<&str>,
        _phone: Option<&str>,
    ) -> Result<CustomerRecord, CustomerError> {
        Err(CustomerError::Unavailable)
    }
}
