//! Lifecycle phase fan-out
//!
//! A phase is awaited on each component of a host, one at a time, in
//! attachment order. The phase completes only once every hook has returned.
//! The first failing hook aborts the rest of the fan-out; nothing is retried.
//!
//! No timeout governs a hook. A component that never returns from `load`
//! blocks its host's startup indefinitely.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::ComponentRegistry;
use crate::errors::LifecycleError;

/// Lifecycle phase fanned out across a host's components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Load state before serving
    Load,
    /// Begin serving
    Start,
    /// Periodic work
    Tick,
    /// Shutdown has begun
    PreStop,
    /// Final teardown
    Stop,
}

impl Phase {
    /// Every phase in lifecycle order
    pub const ALL: [Phase; 5] = [
        Phase::Load,
        Phase::Start,
        Phase::Tick,
        Phase::PreStop,
        Phase::Stop,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Load => write!(f, "load"),
            Phase::Start => write!(f, "start"),
            Phase::Tick => write!(f, "tick"),
            Phase::PreStop => write!(f, "pre_stop"),
            Phase::Stop => write!(f, "stop"),
        }
    }
}

/// Run `phase` on every component of `registry`, sequentially, in attachment order
pub async fn run_phase<C>(
    registry: &ComponentRegistry<C>,
    phase: Phase,
    ctx: &C,
) -> Result<(), LifecycleError>
where
    C: ?Sized + Sync + 'static,
{
    for (name, component) in registry.entries() {
        let result = match phase {
            Phase::Load => component.load(ctx).await,
            Phase::Start => component.start(ctx).await,
            Phase::Tick => component.tick(ctx).await,
            Phase::PreStop => component.pre_stop(ctx).await,
            Phase::Stop => component.stop(ctx).await,
        };

        if let Err(source) = result {
            return Err(LifecycleError::PhaseFailed {
                phase,
                owner: registry.owner().to_string(),
                component: name,
                source,
            });
        }
    }

    tracing::trace!(owner = %registry.owner(), %phase, components = registry.len(), "phase complete");
    Ok(())
}
