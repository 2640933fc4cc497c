//! # Itemgraph Core
//!
//! Typed item interfaces synthesized at runtime from a host UI engine's flat
//! command API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Context                        │
//! ├─────────────────────────────────────────────────────┤
//! │  Catalog          │  Types            │  Codec      │
//! │  - Commands       │  - Mixins / MRO   │  - Capture  │
//! │  - Param tables   │  - Factory        │  - Export   │
//! │  - Kind ids       │  - Registry       │  - Restore  │
//! ├─────────────────────────────────────────────────────┤
//! │  Handles & aliases │  Interfaces (handle + type)    │
//! ├─────────────────────────────────────────────────────┤
//! │               dyn HostEngine (FFI seam)             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The host owns all item state. This crate reads the host's command table
//! once, derives an [`ItemDefinition`] per kind, composes a typed
//! [`ItemType`] from capability mixins, and hands out [`Interface`]s that
//! translate host faults into [`ItemError`]s.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod codec;
pub mod config;
pub mod context;
pub mod diagnose;
pub mod error;
pub mod handle;
pub mod host;
pub mod item;
pub mod mixin;
pub mod types;

pub use catalog::{Catalog, CatalogError, ItemDefinition};
pub use codec::SaveState;
pub use config::ContextConfig;
pub use context::Context;
pub use error::{ConfigFault, ItemError, ItemResult};
pub use handle::{AliasTable, HandleAllocator, Item, Tag};
pub use host::{
    Binding, CommandForm, CommandSpec, CreateArgs, HandleGenerator, HostEngine, HostFault,
    HostResult, ItemCallback, ItemInfo, ParamKind, ParamSpec, ReturnKind,
};
pub use item::Interface;
pub use mixin::{CallbackItem, ContainerItem, ItemView, Mixin, Shape, SizedItem, ValueArray};
pub use types::{ItemType, Property, Registration, TypeBuilder, TypeError, TypeIdentity};

/// Itemgraph core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
