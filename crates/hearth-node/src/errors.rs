//! Node error types

use hearth_core::{ComponentError, LifecycleError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::placement::PlacementError;
use crate::state::NodeState;

/// Errors returned by [`ServerNode::run`](crate::ServerNode::run)
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Global component attachment or lookup failed
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// A lifecycle phase aborted
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Actor group binding failed
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// The node was asked to move against its lifecycle order
    #[error("invalid node transition {from} -> {to}")]
    InvalidTransition {
        /// State the node was in
        from: NodeState,
        /// Requested state
        to: NodeState,
    },
}

impl NodeError {
    /// Whether the process should exit non-zero
    ///
    /// Anything that escapes [`ServerNode::run`](crate::ServerNode::run)
    /// ended the node, so only recoverable placement outcomes are non-fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Placement(err) => err.is_fatal(),
            _ => true,
        }
    }
}
