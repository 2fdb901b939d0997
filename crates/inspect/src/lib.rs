//! Live-tree introspection core.
//!
//! Reconstructs a stable, navigable component hierarchy from the host
//! runtime's double-buffered tree, serializes arbitrary (possibly
//! cyclic) runtime state into a bounded wire representation, and
//! recovers which user hook produced each piece of local state.
//!
//! ## Pipeline
//!
//! ```text
//! locator ──resolve──▶ root node ──walk──▶ ComponentSummary list
//!                                   │ full detail
//!                                   ▼
//!                     serialize + hook provenance (replay)
//! ```
//!
//! Everything is synchronous and budget-bounded. Host-side failures
//! degrade to in-band markers or partial results; the entry points in
//! [`api`] never panic on tree state.

pub mod api;
pub mod error;
pub mod frames;
pub mod identity;
pub mod provenance;
pub mod resolve;
pub mod serialize;
pub mod store;
pub mod types;
pub mod walk;

pub use api::{enumerate_components, resolve_value_at_path};
pub use error::{InspectError, Result};
pub use serialize::{Budgets, Serializer};
pub use types::{
    CollectionKind, ComponentList, ComponentSummary, Document, ElementSummary, KindTag, Locator,
    Mode, PathSeg, PathValue, Section, StateEntry, Truncation,
};
