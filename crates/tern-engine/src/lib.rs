//! Node orchestrator tying all tern components together.
//!
//! The [`TernNode`] owns the identity registry, trust graph, visibility
//! filter and rescue controllers, and exposes refresh, local publishing,
//! listings and lookup on top of them.

pub mod error;
pub mod lookup;
pub mod node;
pub mod registry;
pub mod view;

mod listing;
mod publish;
mod refresh;

pub use error::EngineError;
pub use lookup::LookupResult;
pub use node::{IdentityInfo, RefreshConfig, TernNode, TernNodeConfig};
pub use registry::{IdentitySnapshot, Registry, RegistryView};
pub use view::ViewState;

#[cfg(test)]
mod tests;
