#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! `xcon`: a hierarchical configuration resolution engine for
//! cloud-deployed services.
//!
//! [`Config::get`]/[`Config::get_item`] walk a provider chain across a
//! directory chain, returning the first hit and opportunistically caching
//! the flattened result in a shared table. A per-process expiring memory
//! cache ([`xcon_local_cache::InternalLocalCache`]) sits in front of every
//! provider.
//!
//! `xcon` is split into several subcrates that work in collaboration.
//!
//! - [xcon-core](../xcon_core/index.html) — `Directory`, `DirectoryItem`, the
//!   `Provider` trait, chains, and errors.
//! - [xcon-settings](../xcon_settings/index.html) — `Settings`, logging.
//! - [xcon-local-cache](../xcon_local_cache/index.html) — the per-process
//!   expiring listing cache.
//! - [xcon-providers](../xcon_providers/index.html) — the environment
//!   provider and the remote-backed providers.
//! - [xcon-cache](../xcon_cache/index.html) — the shared-table cache
//!   provider.
//!
//! This crate provides the piece none of the others can: the ambient
//! per-task context stack, the parent-chain inheritance rule, and the
//! public [`Config`] API that ties the rest together.

mod config;
mod inherit;
mod stack;

pub use config::{Config, ExportSpec, LookupOptions};
pub use inherit::{ListItem, Scalar};
pub use stack::{with_stack, ConfigScope};

use anyhow::{Context, Result};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};
use xcon_settings::Settings;

/// Set up logging based on `settings` and the `RUST_LOG` environment
/// variable, the same way the rest of the corpus initializes `tracing`.
///
/// # Errors
/// If a global subscriber has already been installed.
pub fn init_logging(settings: &Settings) -> Result<()> {
    LogTracer::init().context("installing log -> tracing bridge")?;
    let env_filter: EnvFilter = (&settings.logging.levels).into();

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .pretty()
        .finish()
        .with(env_filter);

    tracing::subscriber::set_global_default(subscriber)
        .context("installing global tracing subscriber")?;
    Ok(())
}
