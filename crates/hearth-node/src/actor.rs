//! Actor hosts
//!
//! An actor host is one live instance of a distributed group: a player, a
//! world. It owns a component registry instantiated from the group's
//! blueprint and processes its mailbox one message at a time. Component
//! phases for a host never overlap each other or its message handling,
//! because both run on the host's single task.
//!
//! # Turn-Based Processing
//!
//! ```text
//! activate: instantiate blueprint → load → start → ready
//! serve:    receive(message) one at a time
//! retire:   pre_stop → stop
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::{
    run_phase, ActorPath, Blueprint, Component, ComponentError, ComponentRegistry, EntityId,
    LifecycleError, Phase,
};
use tokio::sync::{mpsc, oneshot};

use crate::context::NodeContext;
use crate::placement::PlacementError;

/// Type-erased message delivered to an actor host
pub struct Envelope {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Envelope {
    /// Wrap a message
    pub fn new<M: Any + Send>(message: M) -> Self {
        Self {
            payload: Box::new(message),
            type_name: type_name::<M>(),
        }
    }

    /// Whether the payload is an `M`
    pub fn is<M: Any + Send>(&self) -> bool {
        self.payload.is::<M>()
    }

    /// Borrow the payload as an `M`
    pub fn downcast_ref<M: Any + Send>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    /// Take the payload as an `M`, or get the envelope back
    pub fn downcast<M: Any + Send>(self) -> Result<M, Envelope> {
        let type_name = self.type_name;
        self.payload
            .downcast::<M>()
            .map(|message| *message)
            .map_err(|payload| Envelope { payload, type_name })
    }

    /// Type name of the wrapped message
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Envelope").field(&self.type_name).finish()
    }
}

/// Constructor argument handed to every blueprint entry of an actor group
#[derive(Debug, Clone)]
pub struct EntitySeed {
    /// Shard key of the instance being activated
    pub entity: EntityId,
    /// Address of the instance
    pub path: ActorPath,
    /// Node hosting the instance
    pub node: Arc<NodeContext>,
}

/// One live actor instance and its components
pub struct ActorHost {
    path: ActorPath,
    node: Arc<NodeContext>,
    components: ComponentRegistry<ActorHost>,
}

impl ActorHost {
    /// Build the host for `seed` from the group's blueprint
    pub fn instantiate(
        seed: &EntitySeed,
        blueprint: &Blueprint<ActorHost, EntitySeed>,
    ) -> Result<Self, ComponentError> {
        let components = blueprint.instantiate(seed.path.to_string(), seed)?;
        Ok(Self {
            path: seed.path.clone(),
            node: seed.node.clone(),
            components,
        })
    }

    /// Address of this instance
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Shard key of this instance
    pub fn entity(&self) -> &EntityId {
        self.path.entity()
    }

    /// Node hosting this instance
    pub fn node(&self) -> &Arc<NodeContext> {
        &self.node
    }

    /// This instance's components
    pub fn components(&self) -> &ComponentRegistry<ActorHost> {
        &self.components
    }

    /// Look up one of this instance's components
    pub fn component<T: Component<ActorHost>>(&self) -> Result<Arc<T>, ComponentError> {
        self.components.get::<T>().map_err(|err| {
            tracing::error!(path = %self.path, %err, "actor component lookup failed");
            err
        })
    }

    /// Fan `phase` out across this instance's components
    pub async fn run_phase(&self, phase: Phase) -> Result<(), LifecycleError> {
        run_phase(&self.components, phase, self).await
    }
}

impl fmt::Debug for ActorHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHost")
            .field("path", &self.path)
            .field("components", &self.components.names())
            .finish_non_exhaustive()
    }
}

/// Message handling of an actor group
#[async_trait]
pub trait ActorBehavior: Send + Sync + 'static {
    /// Handle one message; never called concurrently for the same host
    async fn receive(&self, host: &ActorHost, message: Envelope) -> Result<(), ComponentError>;
}

pub(crate) enum Mail {
    Deliver(Envelope),
    Stop,
}

/// Handle to a live actor host's mailbox
#[derive(Clone)]
pub struct ActorRef {
    path: ActorPath,
    mailbox: mpsc::Sender<Mail>,
}

impl ActorRef {
    pub(crate) fn new(path: ActorPath, mailbox: mpsc::Sender<Mail>) -> Self {
        Self { path, mailbox }
    }

    /// Address of the referenced actor
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Whether the actor still accepts messages
    pub fn is_alive(&self) -> bool {
        !self.mailbox.is_closed()
    }

    /// Enqueue `message`, waiting for mailbox capacity
    pub async fn tell(&self, message: Envelope) -> Result<(), PlacementError> {
        self.mailbox
            .send(Mail::Deliver(message))
            .await
            .map_err(|_| PlacementError::ActorStopped {
                path: self.path.to_string(),
            })
    }

    /// Ask the actor to retire after the messages already queued
    pub(crate) async fn stop(&self) {
        // A closed mailbox means the actor is already gone.
        let _ = self.mailbox.send(Mail::Stop).await;
    }

    pub(crate) fn same_mailbox(&self, other: &ActorRef) -> bool {
        self.mailbox.same_channel(&other.mailbox)
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("path", &self.path)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Activation failure of one actor host
#[derive(Debug, thiserror::Error)]
enum ActivationError {
    #[error(transparent)]
    Component(#[from] ComponentError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl ActivationError {
    fn into_fatal(self) -> Option<ComponentError> {
        match self {
            Self::Component(err) if err.is_fatal() => Some(err),
            Self::Lifecycle(err) if err.is_fatal() => Some(err.into_source()),
            _ => None,
        }
    }
}

/// Body of an actor host's task
///
/// Reports activation on `ready` before serving. Messages sent while the
/// host activates wait in the mailbox. A failed activation runs no shutdown
/// phases, drops whatever was queued and ends the task.
///
/// Fatal component errors are handed to the node, which then stops; other
/// failures are logged and the host keeps serving.
pub(crate) async fn run_actor(
    seed: EntitySeed,
    blueprint: Arc<Blueprint<ActorHost, EntitySeed>>,
    behavior: Arc<dyn ActorBehavior>,
    mut mailbox: mpsc::Receiver<Mail>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let host = match activate(&seed, &blueprint).await {
        Ok(host) => host,
        Err(err) => {
            mailbox.close();
            let mut dropped = 0usize;
            while mailbox.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                tracing::warn!(path = %seed.path, dropped, "dropped messages queued for failed activation");
            }
            let reason = err.to_string();
            if let Some(fatal) = err.into_fatal() {
                seed.node.report_fatal(fatal);
            }
            let _ = ready.send(Err(reason));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        tracing::debug!(path = %host.path(), "activation abandoned by caller");
    }
    tracing::debug!(path = %host.path(), "actor activated");

    while let Some(mail) = mailbox.recv().await {
        match mail {
            Mail::Deliver(message) => {
                let message_type = message.type_name();
                match behavior.receive(&host, message).await {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => host.node().report_fatal(err),
                    Err(err) => {
                        tracing::warn!(path = %host.path(), message_type, %err, "actor message failed");
                    }
                }
            }
            Mail::Stop => break,
        }
    }
    mailbox.close();

    for phase in [Phase::PreStop, Phase::Stop] {
        match host.run_phase(phase).await {
            Ok(()) => {}
            Err(err) if err.is_fatal() => host.node().report_fatal(err.into_source()),
            Err(err) => tracing::warn!(path = %host.path(), %err, "actor shutdown phase failed"),
        }
    }
    tracing::debug!(path = %host.path(), "actor deactivated");
}

async fn activate(
    seed: &EntitySeed,
    blueprint: &Blueprint<ActorHost, EntitySeed>,
) -> Result<ActorHost, ActivationError> {
    let host = ActorHost::instantiate(seed, blueprint)?;
    host.run_phase(Phase::Load).await?;
    host.run_phase(Phase::Start).await?;
    Ok(host)
}
