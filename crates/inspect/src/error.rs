//! Error types for inspection requests.
//!
//! Simple, flat error hierarchy. Resolution failures surface here;
//! serialization overruns stay in-band as dehydrated tokens and host
//! read failures become per-key markers, so neither is an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InspectError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InspectError {
    #[error("no live node reachable from the request target")]
    MissingNearest,

    #[error("no root ancestor reachable from the resolved node")]
    MissingRoot,

    #[error("unknown component id: {0}")]
    UnknownComponent(String),

    #[error("path does not resolve: {0}")]
    BadPath(String),

    #[error("value at path is not a function")]
    NotAFunction,
}

impl InspectError {
    /// Short machine-readable reason for the wire boundary.
    pub fn reason(&self) -> &'static str {
        match self {
            InspectError::MissingNearest => "missing-nearest",
            InspectError::MissingRoot => "missing-root",
            InspectError::UnknownComponent(_) => "unknown-component",
            InspectError::BadPath(_) => "bad-path",
            InspectError::NotAFunction => "not-a-function",
        }
    }
}
