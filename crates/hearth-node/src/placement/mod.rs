//! Placement layer: binds shard roles to distributed actor groups
//!
//! A node either hosts a group, owning live instances that the placement
//! service activates on demand, or proxies it, forwarding messages to the
//! nodes that host it. Both bindings happen while the node is in
//! `PlacementStarting`; a failure there is fatal for the node.
//!
//! # Design
//!
//! - [`PlacementService`] is a trait so a node can run against the
//!   in-process [`LocalPlacement`] or a clustered implementation.
//! - Messages are routed by shard key. The caller supplies the
//!   [`ShardKeyExtractor`] that maps a message to the entity it targets.

mod local;

pub use local::LocalPlacement;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hearth_core::{ActorPath, AddressError, Blueprint, EntityId, RoleType, ShardRole};
use thiserror::Error;

use crate::actor::{ActorBehavior, ActorHost, ActorRef, EntitySeed, Envelope};
use crate::context::NodeContext;

/// Errors from placement operations
#[derive(Debug, Error)]
pub enum PlacementError {
    /// A group could not be hosted or proxied
    #[error("failed to start {role} group: {reason}")]
    StartFailed {
        /// Group being bound
        role: ShardRole,
        /// Why the binding failed
        reason: String,
    },

    /// No live local actor answers the address
    #[error("no live actor at {path}")]
    PathNotFound {
        /// Address that was looked up
        path: String,
    },

    /// The group was never started on this node
    #[error("{role} group is not started")]
    RegionNotStarted {
        /// Group addressed
        role: ShardRole,
    },

    /// The shard-key extractor found no entity in the message
    #[error("{message_type} carries no shard key for the {role} group")]
    UnroutableMessage {
        /// Group addressed
        role: ShardRole,
        /// Type name of the rejected message
        message_type: &'static str,
    },

    /// The actor could not be brought up
    #[error("activation of {path} failed: {reason}")]
    ActivationFailed {
        /// Address of the instance
        path: String,
        /// Why activation failed
        reason: String,
    },

    /// The actor retired before the message could be enqueued
    #[error("actor {path} has stopped")]
    ActorStopped {
        /// Address of the instance
        path: String,
    },

    /// An address string did not parse
    #[error(transparent)]
    Address(#[from] AddressError),
}

impl PlacementError {
    /// Binding failures end the node; routing outcomes are recoverable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StartFailed { .. })
    }
}

/// Maps a message to the entity it addresses
pub trait ShardKeyExtractor: Send + Sync {
    /// Shard key of `message`, or `None` if the message cannot be routed
    fn entity_id(&self, message: &Envelope) -> Option<EntityId>;
}

impl<F> ShardKeyExtractor for F
where
    F: Fn(&Envelope) -> Option<EntityId> + Send + Sync,
{
    fn entity_id(&self, message: &Envelope) -> Option<EntityId> {
        self(message)
    }
}

/// Extractor routing messages of type `M` through `key`; other types are unroutable
pub fn typed_extractor<M, F>(key: F) -> Arc<dyn ShardKeyExtractor>
where
    M: Any + Send,
    F: Fn(&M) -> EntityId + Send + Sync + 'static,
{
    Arc::new(move |message: &Envelope| message.downcast_ref::<M>().map(&key))
}

/// What a node supplies to host a group
#[derive(Clone)]
pub struct HostedGroup {
    extractor: Arc<dyn ShardKeyExtractor>,
    blueprint: Arc<Blueprint<ActorHost, EntitySeed>>,
    behavior: Arc<dyn ActorBehavior>,
}

impl HostedGroup {
    /// Group whose instances are built from `blueprint` and driven by `behavior`
    pub fn new(
        extractor: Arc<dyn ShardKeyExtractor>,
        blueprint: Blueprint<ActorHost, EntitySeed>,
        behavior: impl ActorBehavior,
    ) -> Self {
        Self {
            extractor,
            blueprint: Arc::new(blueprint),
            behavior: Arc::new(behavior),
        }
    }

    /// Component blueprint of the group's instances
    pub fn blueprint(&self) -> &Blueprint<ActorHost, EntitySeed> {
        &self.blueprint
    }
}

impl fmt::Debug for HostedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedGroup")
            .field("blueprint", &self.blueprint)
            .finish_non_exhaustive()
    }
}

/// A hosted group as handed to the placement service
///
/// Holds the node weakly: the node owns its placement service, and live
/// instances hold the node strongly only while they run.
#[derive(Clone)]
pub struct HostedRegion {
    /// Shard-key extraction for routed messages
    pub extractor: Arc<dyn ShardKeyExtractor>,
    /// Component blueprint of each instance
    pub blueprint: Arc<Blueprint<ActorHost, EntitySeed>>,
    /// Message handling of each instance
    pub behavior: Arc<dyn ActorBehavior>,
    /// Node hosting the region
    pub node: Weak<NodeContext>,
}

impl fmt::Debug for HostedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedRegion")
            .field("blueprint", &self.blueprint)
            .finish_non_exhaustive()
    }
}

/// How a node binds one shard role
#[derive(Debug, Clone)]
pub enum GroupBinding {
    /// Own live instances of the group
    Host {
        /// Group bound
        role: ShardRole,
        /// Instance construction and behavior
        group: HostedGroup,
    },
    /// Forward to the nodes hosting the group
    Proxy {
        /// Group bound
        role: ShardRole,
    },
}

impl GroupBinding {
    /// Shard role this binding is for
    pub fn role(&self) -> ShardRole {
        match self {
            Self::Host { role, .. } | Self::Proxy { role } => *role,
        }
    }
}

/// Distributed actor placement as seen by one node
#[async_trait]
pub trait PlacementService: Send + Sync {
    /// Host `role` on this node
    async fn start_region(&self, role: ShardRole, region: HostedRegion) -> Result<(), PlacementError>;

    /// Reach `role` through a proxy from a node of kind `from`
    async fn start_proxy(&self, role: ShardRole, from: RoleType) -> Result<(), PlacementError>;

    /// Route `message` to the instance its shard key selects
    async fn tell(&self, role: ShardRole, message: Envelope) -> Result<(), PlacementError>;

    /// Find the live local instance at `path`
    fn resolve(&self, path: &ActorPath) -> Result<ActorRef, PlacementError>;

    /// Retire every live local instance and forget all bindings
    async fn shutdown(&self);
}

/// Bind every group of the node, stopping at the first failure
pub(crate) async fn bind_groups(
    node: &Arc<NodeContext>,
    bindings: Vec<GroupBinding>,
) -> Result<(), PlacementError> {
    for binding in bindings {
        match binding {
            GroupBinding::Host { role, group } => {
                let region = HostedRegion {
                    extractor: group.extractor,
                    blueprint: group.blueprint,
                    behavior: group.behavior,
                    node: Arc::downgrade(node),
                };
                node.placement().start_region(role, region).await?;
                tracing::info!(%role, node_role = %node.role(), "hosting group");
            }
            GroupBinding::Proxy { role } => {
                node.placement().start_proxy(role, node.role()).await?;
                tracing::info!(%role, node_role = %node.role(), "proxying group");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Login {
        player: u64,
    }

    #[test]
    fn test_typed_extractor_routes_only_its_type() {
        let extractor = typed_extractor(|login: &Login| EntityId::from(login.player));

        assert_eq!(
            extractor.entity_id(&Envelope::new(Login { player: 42 })),
            Some(EntityId::from(42u64))
        );
        assert_eq!(extractor.entity_id(&Envelope::new("stray")), None);
    }

    #[test]
    fn test_only_binding_failures_are_fatal() {
        assert!(PlacementError::StartFailed {
            role: ShardRole::Player,
            reason: "x".into()
        }
        .is_fatal());
        assert!(!PlacementError::PathNotFound { path: "p".into() }.is_fatal());
        assert!(!PlacementError::UnroutableMessage {
            role: ShardRole::World,
            message_type: "m"
        }
        .is_fatal());
    }
}
