//! Host UI runtime model
//!
//! The live component tree that the `inspect` crate introspects. Nodes
//! are owned and mutated by this runtime; the inspector only reads them
//! and must tolerate whatever state it finds.
//!
//! ## Core design
//!
//! ```text
//! Component (render fn) ──mount──▶ TreeNode graph ──renders──▶ Element tree
//!                                      │ alternate                 │ bounds,
//!                                      ▼ (previous render)         ▼ selectors
//!                                  TreeNode graph             Document (hit test)
//! ```
//!
//! Hook calls go through a process-wide dispatch table; every call site
//! pushes a frame onto the thread-local call stack so captured traces
//! carry real host-internal and user frames.

pub mod document;
pub mod error;
pub mod hooks;
pub mod mount;
pub mod node;
pub mod stack;
pub mod value;

pub use document::{Document, Element, Rect};
pub use error::{HostError, Result};
pub use hooks::{ContextHandle, Dispatcher, HookState, Primitive, StateCell};
pub use mount::{mount, rerender, ElementSpec, Mounted, TreeBuilder};
pub use node::{Component, NodeKind, TreeNode};
pub use value::{FuncVal, LazyProp, Value};
