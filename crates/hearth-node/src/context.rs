//! Node context threaded through every global hook and actor host

use std::fmt;
use std::sync::Arc;

use hearth_core::{
    run_phase, ActorLocator, Component, ComponentError, ComponentRegistry, LifecycleError, Phase,
    RoleType, ShardRole,
};

use parking_lot::Mutex;

use crate::actor::{ActorRef, Envelope};
use crate::config::NodeConfig;
use crate::placement::{PlacementError, PlacementService};
use crate::ticker::QuitFlag;

/// Everything a node-level component may reach
///
/// Built once at the end of `Configuring` and shared behind an `Arc` with the
/// tick loop and every actor host of the node.
///
/// Fatal errors raised away from the node's own call path (a tick task, an
/// actor's mailbox) are parked here and the quit flag is raised; the node
/// returns the first of them once it has shut down.
pub struct NodeContext {
    role: RoleType,
    config: NodeConfig,
    globals: ComponentRegistry<NodeContext>,
    placement: Arc<dyn PlacementService>,
    quit: QuitFlag,
    fatal: Mutex<Option<ComponentError>>,
}

impl NodeContext {
    pub(crate) fn new(
        role: RoleType,
        config: NodeConfig,
        globals: ComponentRegistry<NodeContext>,
        placement: Arc<dyn PlacementService>,
        quit: QuitFlag,
    ) -> Self {
        Self {
            role,
            config,
            globals,
            placement,
            quit,
            fatal: Mutex::new(None),
        }
    }

    /// Role this node plays
    pub fn role(&self) -> RoleType {
        self.role
    }

    /// Resolved configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Global component registry
    pub fn globals(&self) -> &ComponentRegistry<NodeContext> {
        &self.globals
    }

    /// Placement service the node's groups are bound to
    pub fn placement(&self) -> &Arc<dyn PlacementService> {
        &self.placement
    }

    /// Look up a global component
    ///
    /// A missing component means the node was assembled wrong; the error is
    /// logged here and is fatal once it reaches the node.
    pub fn component<T: Component<NodeContext>>(&self) -> Result<Arc<T>, ComponentError> {
        self.globals.get::<T>().map_err(|err| {
            tracing::error!(role = %self.role, %err, "global component lookup failed");
            err
        })
    }

    /// Route `message` to the group bound to `role`
    pub async fn tell(&self, role: ShardRole, message: Envelope) -> Result<(), PlacementError> {
        self.placement.tell(role, message).await
    }

    /// Resolve a locator to a live local actor
    pub fn resolve(&self, locator: &ActorLocator) -> Result<ActorRef, PlacementError> {
        self.placement.resolve(locator.path())
    }

    /// Fan `phase` out across the global components
    pub async fn run_global_phase(&self, phase: Phase) -> Result<(), LifecycleError> {
        run_phase(&self.globals, phase, self).await
    }

    /// Stop the node over an unrecoverable error
    ///
    /// Only the first error is kept; later ones are logged.
    pub fn report_fatal(&self, err: ComponentError) {
        tracing::error!(role = %self.role, %err, "fatal component error, stopping node");
        {
            let mut slot = self.fatal.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.quit.raise();
    }

    /// Whether a fatal error was reported
    pub fn has_fatal(&self) -> bool {
        self.fatal.lock().is_some()
    }

    pub(crate) fn take_fatal(&self) -> Option<ComponentError> {
        self.fatal.lock().take()
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("role", &self.role)
            .field("system_name", &self.config.system_name)
            .field("globals", &self.globals.names())
            .field("fatal", &self.has_fatal())
            .finish_non_exhaustive()
    }
}
