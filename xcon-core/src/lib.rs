#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Core domain types for the `xcon` hierarchical configuration resolution
//! engine: directories, items, the provider contract, and the chains that
//! orchestrate traversal across them.

mod directory;
mod errors;
mod item;
mod pool;
mod provider;

pub use directory::{Directory, DirectoryChain, NON_EXISTENT_PATH};
pub use errors::{ConfigError, ProviderError};
pub use item::{DirectoryItem, ItemValue, TableRecord};
pub use pool::{Connection, ConnectionPool};
pub use provider::{Provider, ProviderChain};
