//! Tool registry: compiled-in plug-ins exposing a declarative JSON schema
//! plus an async handler, executed by name under a per-tool timeout.
//!
//! Grounded on `skynet-agent/src/tools/mod.rs`'s `Tool` trait and registry
//! shape, reframed from directory-scan discovery to an explicit
//! compiled-in registry (`build_registry`).

pub mod builtin;
pub mod capability;
pub mod registry;

pub use capability::ToolCapabilities;
pub use registry::{build_registry, ToolRegistry};
