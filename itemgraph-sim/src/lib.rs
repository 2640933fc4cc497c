//! # Itemgraph Sim
//!
//! In-memory reference implementation of [`HostEngine`].
//!
//! The simulated engine exposes a realistic flat command namespace (simple
//! `add_*` commands, scoped container twins, irregular names), keeps an alias
//! registry, a container stack and a reserved handle range, and records item
//! state without rendering anything. Tests and the CLI run the whole core
//! against it.
//!
//! [`HostEngine`]: itemgraph_core::HostEngine

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod commands;
pub mod host;

use std::sync::Arc;

use itemgraph_core::{Context, ContextConfig, ItemResult};

pub use commands::{CommandTable, KindEntry};
pub use host::{SimHost, RESERVED_HANDLES};

/// Create a fresh simulated host and a context over it.
///
/// # Errors
///
/// See [`Context::new`].
pub fn sim_context(config: ContextConfig) -> ItemResult<(Arc<SimHost>, Context)> {
    let host = Arc::new(SimHost::new());
    let ctx = Context::new(Arc::clone(&host) as Arc<dyn itemgraph_core::HostEngine>, config)?;
    Ok((host, ctx))
}
