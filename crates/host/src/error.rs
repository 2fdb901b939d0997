//! Error types for host-tree access.
//!
//! Simple, flat error hierarchy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("property read failed: {0}")]
    PropertyRead(String),

    #[error("element is detached from the document")]
    DetachedElement,

    #[error("component has no render function")]
    NoRenderFunction,
}
