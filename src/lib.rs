//! Multi-tenant sales pipeline management: pipelines and stages, leads with
//! an open/won/lost lifecycle, activity trails, loss reasons and per-hub
//! settings. Storage goes through the [`store::LeadStore`] trait; a Postgres
//! backend ships alongside an in-memory one for tests.

pub mod customers;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::{CrmError, CrmResult, StoreError};
pub use services::Crm;
