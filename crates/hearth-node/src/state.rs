//! Process host state machine
//!
//! Transitions only move forward. Every pre-running state may fall through
//! to `Stopping` when startup fails, and `Stopped` is reachable only from
//! `Stopping`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a server node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Built, not yet configured
    Created,
    /// Resolving configuration and attaching global components
    Configuring,
    /// Global `load` phase
    Loading,
    /// Binding actor groups to placement
    PlacementStarting,
    /// Global `start` phase, then the tick loop
    Running,
    /// Global `pre_stop` phase and placement shutdown
    Stopping,
    /// Global `stop` phase done; terminal
    Stopped,
}

impl NodeState {
    /// Whether the node may move from `self` to `next`
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Created, Configuring)
                | (Configuring, Loading)
                | (Loading, PlacementStarting)
                | (PlacementStarting, Running)
                | (Configuring | Loading | PlacementStarting | Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Whether the node has finished
    pub fn is_terminal(self) -> bool {
        self == NodeState::Stopped
    }

    /// Snake-case state name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Created => "created",
            NodeState::Configuring => "configuring",
            NodeState::Loading => "loading",
            NodeState::PlacementStarting => "placement_starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
