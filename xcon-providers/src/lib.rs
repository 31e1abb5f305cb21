#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Concrete [`xcon_core::Provider`] implementations: the process
//! environment, and generic remote-backed providers (parameter store,
//! secrets vault, content table) that are generic over a small client trait
//! supplied by the embedding service.

mod content_table;
mod environmental;
mod parameter_store;
mod remote;
mod secrets_vault;

pub use content_table::ContentTableProvider;
pub use environmental::EnvironmentalProvider;
pub use parameter_store::ParameterStoreProvider;
pub use remote::{ConnectionPool, ContentTableClient, ParameterStoreClient, SecretsVaultClient};
pub use secrets_vault::SecretsVaultProvider;
