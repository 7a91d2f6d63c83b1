//! In-process placement for single-node deployments and tests
//!
//! Every hosted group is a region holding the live instances of that group
//! on this node. An instance is activated on the first message routed to its
//! entity and stays live until the service shuts down. A proxy is accepted
//! only for a group some region of the same service hosts, and routes to it.
//!
//! # Activation
//!
//! The first message for a cold entity registers the instance's mailbox
//! right away and then waits for its `load` and `start` to finish. Messages
//! for the same entity arriving meanwhile queue in that mailbox and are
//! served once activation succeeds. No lock is held while an instance
//! activates, so hooks may message other instances of any group.
//!
//! An instance whose own activation hooks message itself never becomes
//! ready: its activation waits on a mailbox nothing drains yet.
//!
//! # Blocking Lock Usage
//!
//! Region and instance maps use `parking_lot::Mutex`: lookups and inserts
//! only, never held across `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::{ActorPath, EntityId, RoleType, ShardRole};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{HostedRegion, PlacementError, PlacementService};
use crate::actor::{run_actor, ActorRef, EntitySeed, Envelope};
use crate::config::NodeConfig;

struct LiveActor {
    actor: ActorRef,
    task: JoinHandle<()>,
    ready: bool,
}

#[derive(Default)]
struct Instances {
    closed: bool,
    live: HashMap<EntityId, LiveActor>,
}

/// Outcome of routing to an entity
enum Routed {
    /// Already registered, possibly still activating
    Existing(ActorRef),
    /// Registered by this call; activation outcome arrives on the receiver
    Spawned(ActorRef, oneshot::Receiver<Result<(), String>>),
}

struct Region {
    role: ShardRole,
    hosted: HostedRegion,
    instances: Mutex<Instances>,
}

impl Region {
    fn new(role: ShardRole, hosted: HostedRegion) -> Self {
        Self {
            role,
            hosted,
            instances: Mutex::new(Instances::default()),
        }
    }

    /// Ready instance for `entity`, if any
    fn live(&self, entity: &EntityId) -> Option<ActorRef> {
        self.instances
            .lock()
            .live
            .get(entity)
            .filter(|live| live.ready)
            .map(|live| live.actor.clone())
            .filter(ActorRef::is_alive)
    }

    fn live_count(&self) -> usize {
        self.instances
            .lock()
            .live
            .values()
            .filter(|live| live.ready && live.actor.is_alive())
            .count()
    }

    /// Find the instance for `entity` or register a new one
    fn route(
        &self,
        system: &str,
        mailbox_capacity: usize,
        entity: &EntityId,
    ) -> Result<Routed, PlacementError> {
        let mut instances = self.instances.lock();
        if instances.closed {
            return Err(PlacementError::RegionNotStarted { role: self.role });
        }
        if let Some(live) = instances.live.get(entity).filter(|live| live.actor.is_alive()) {
            return Ok(Routed::Existing(live.actor.clone()));
        }

        let path = ActorPath::new(system, self.role, entity.clone());
        let Some(node) = self.hosted.node.upgrade() else {
            return Err(PlacementError::ActorStopped {
                path: path.to_string(),
            });
        };

        let (mailbox, inbox) = mpsc::channel(mailbox_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let seed = EntitySeed {
            entity: entity.clone(),
            path: path.clone(),
            node,
        };
        let task = tokio::spawn(run_actor(
            seed,
            self.hosted.blueprint.clone(),
            self.hosted.behavior.clone(),
            inbox,
            ready_tx,
        ));

        let actor = ActorRef::new(path, mailbox);
        instances.live.insert(
            entity.clone(),
            LiveActor {
                actor: actor.clone(),
                task,
                ready: false,
            },
        );
        Ok(Routed::Spawned(actor, ready_rx))
    }

    /// Instance accepting messages for `entity`, activating it if cold
    async fn activate(
        &self,
        system: &str,
        mailbox_capacity: usize,
        entity: &EntityId,
    ) -> Result<ActorRef, PlacementError> {
        let (actor, ready) = match self.route(system, mailbox_capacity, entity)? {
            Routed::Existing(actor) => return Ok(actor),
            Routed::Spawned(actor, ready) => (actor, ready),
        };

        let reason = match ready.await {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some("actor task exited during activation".to_string()),
        };
        if let Some(reason) = reason {
            tracing::warn!(path = %actor.path(), %reason, "actor activation failed");
            self.forget(entity, &actor);
            return Err(PlacementError::ActivationFailed {
                path: actor.path().to_string(),
                reason,
            });
        }

        if let Some(live) = self.instances.lock().live.get_mut(entity) {
            if live.actor.same_mailbox(&actor) {
                live.ready = true;
            }
        }
        Ok(actor)
    }

    fn forget(&self, entity: &EntityId, actor: &ActorRef) {
        let mut instances = self.instances.lock();
        if instances
            .live
            .get(entity)
            .is_some_and(|live| live.actor.same_mailbox(actor))
        {
            instances.live.remove(entity);
        }
    }

    /// Stop every instance after its queued messages and wait for it
    async fn retire(&self) {
        let retiring: Vec<LiveActor> = {
            let mut instances = self.instances.lock();
            instances.closed = true;
            instances.live.drain().map(|(_, live)| live).collect()
        };
        for live in &retiring {
            live.actor.stop().await;
        }
        for live in retiring {
            if let Err(err) = live.task.await {
                tracing::warn!(path = %live.actor.path(), %err, "actor task ended abnormally");
            }
        }
    }
}

/// Placement service keeping every group inside this process
pub struct LocalPlacement {
    system: String,
    mailbox_capacity: usize,
    regions: Mutex<BTreeMap<ShardRole, Arc<Region>>>,
    proxies: Mutex<BTreeMap<ShardRole, RoleType>>,
}

impl LocalPlacement {
    /// Service naming its actors under `system`
    pub fn new(system: impl Into<String>, mailbox_capacity: usize) -> Self {
        Self {
            system: system.into(),
            mailbox_capacity: mailbox_capacity.max(1),
            regions: Mutex::new(BTreeMap::new()),
            proxies: Mutex::new(BTreeMap::new()),
        }
    }

    /// Service configured from a node's placement settings
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.system_name.clone(), config.placement.mailbox_capacity)
    }

    /// Whether `role` is hosted here
    pub fn is_hosting(&self, role: ShardRole) -> bool {
        self.regions.lock().contains_key(&role)
    }

    /// Whether `role` is proxied here
    pub fn is_proxying(&self, role: ShardRole) -> bool {
        self.proxies.lock().contains_key(&role)
    }

    /// Number of live instances of `role`
    pub fn live_actors(&self, role: ShardRole) -> usize {
        self.region(role).map_or(0, |region| region.live_count())
    }

    fn region(&self, role: ShardRole) -> Result<Arc<Region>, PlacementError> {
        self.regions
            .lock()
            .get(&role)
            .cloned()
            .ok_or(PlacementError::RegionNotStarted { role })
    }
}

#[async_trait]
impl PlacementService for LocalPlacement {
    async fn start_region(&self, role: ShardRole, region: HostedRegion) -> Result<(), PlacementError> {
        if self.is_proxying(role) {
            return Err(PlacementError::StartFailed {
                role,
                reason: "group is already proxied by this node".to_string(),
            });
        }
        let mut regions = self.regions.lock();
        if regions.contains_key(&role) {
            return Err(PlacementError::StartFailed {
                role,
                reason: "group is already hosted".to_string(),
            });
        }
        regions.insert(role, Arc::new(Region::new(role, region)));
        Ok(())
    }

    async fn start_proxy(&self, role: ShardRole, from: RoleType) -> Result<(), PlacementError> {
        if !self.is_hosting(role) {
            return Err(PlacementError::StartFailed {
                role,
                reason: format!("no region hosts the group for {from} nodes to proxy"),
            });
        }
        self.proxies.lock().insert(role, from);
        Ok(())
    }

    async fn tell(&self, role: ShardRole, message: Envelope) -> Result<(), PlacementError> {
        let region = self.region(role)?;
        let Some(entity) = region.hosted.extractor.entity_id(&message) else {
            return Err(PlacementError::UnroutableMessage {
                role,
                message_type: message.type_name(),
            });
        };

        let actor = region
            .activate(&self.system, self.mailbox_capacity, &entity)
            .await?;
        actor.tell(message).await.map_err(|err| {
            region.forget(&entity, &actor);
            err
        })
    }

    fn resolve(&self, path: &ActorPath) -> Result<ActorRef, PlacementError> {
        let not_found = || PlacementError::PathNotFound {
            path: path.to_string(),
        };
        if path.system() != self.system {
            return Err(not_found());
        }
        self.region(path.group())
            .ok()
            .and_then(|region| region.live(path.entity()))
            .ok_or_else(not_found)
    }

    async fn shutdown(&self) {
        let regions = std::mem::take(&mut *self.regions.lock());
        self.proxies.lock().clear();

        for (role, region) in regions {
            let live = region.live_count();
            region.retire().await;
            tracing::info!(%role, live, "region stopped");
        }
    }
}

impl std::fmt::Debug for LocalPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPlacement")
            .field("system", &self.system)
            .field("hosted", &self.regions.lock().keys().collect::<Vec<_>>())
            .field("proxied", &self.proxies.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorBehavior, ActorHost};
    use crate::context::NodeContext;
    use crate::placement::ShardKeyExtractor;
    use crate::ticker::QuitFlag;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use hearth_core::{Blueprint, Component, ComponentError, ComponentRegistry};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Visit {
        player: u64,
        note: &'static str,
    }

    struct Ask {
        player: u64,
        reply: oneshot::Sender<String>,
    }

    struct Tracker {
        entity: String,
        journal: Journal,
        fail_load: bool,
    }

    impl Tracker {
        fn note(&self, what: &str) {
            self.journal.lock().push(format!("{}:{what}", self.entity));
        }
    }

    #[async_trait]
    impl Component<ActorHost> for Tracker {
        async fn load(&self, _host: &ActorHost) -> Result<(), ComponentError> {
            self.note("load");
            if self.fail_load {
                return Err(ComponentError::failed::<Self>("no saved state"));
            }
            Ok(())
        }

        async fn start(&self, _host: &ActorHost) -> Result<(), ComponentError> {
            self.note("start");
            Ok(())
        }

        async fn pre_stop(&self, _host: &ActorHost) -> Result<(), ComponentError> {
            self.note("pre_stop");
            Ok(())
        }

        async fn stop(&self, _host: &ActorHost) -> Result<(), ComponentError> {
            self.note("stop");
            Ok(())
        }
    }

    struct Visitors {
        journal: Journal,
    }

    #[async_trait]
    impl ActorBehavior for Visitors {
        async fn receive(&self, host: &ActorHost, message: Envelope) -> Result<(), ComponentError> {
            let message = match message.downcast::<Visit>() {
                Ok(visit) => {
                    self.journal
                        .lock()
                        .push(format!("{}:visit:{}", host.entity(), visit.note));
                    return Ok(());
                }
                Err(other) => other,
            };
            match message.downcast::<Ask>() {
                Ok(ask) => {
                    let _ = ask.reply.send(host.path().to_string());
                    Ok(())
                }
                Err(other) => Err(ComponentError::failed::<Self>(format!(
                    "unexpected {}",
                    other.type_name()
                ))),
            }
        }
    }

    fn extractor() -> Arc<dyn ShardKeyExtractor> {
        Arc::new(|message: &Envelope| {
            message
                .downcast_ref::<Visit>()
                .map(|visit| visit.player)
                .or_else(|| message.downcast_ref::<Ask>().map(|ask| ask.player))
                .map(EntityId::from)
        })
    }

    fn region(node: &Arc<NodeContext>, journal: &Journal, fail_load: bool) -> HostedRegion {
        let tracked = journal.clone();
        let blueprint = Blueprint::new("player")
            .with(move |seed: &EntitySeed| Tracker {
                entity: seed.entity.to_string(),
                journal: tracked.clone(),
                fail_load,
            })
            .unwrap();
        HostedRegion {
            extractor: extractor(),
            blueprint: Arc::new(blueprint),
            behavior: Arc::new(Visitors {
                journal: journal.clone(),
            }),
            node: Arc::downgrade(node),
        }
    }

    fn setup() -> (Arc<LocalPlacement>, Arc<NodeContext>, Journal) {
        let placement = Arc::new(LocalPlacement::new("game", 16));
        let node = Arc::new(NodeContext::new(
            RoleType::Home,
            NodeConfig::default(),
            ComponentRegistry::new("global"),
            placement.clone(),
            QuitFlag::new(),
        ));
        (placement, node, Journal::default())
    }

    fn player_path(player: u64) -> ActorPath {
        ActorPath::new("game", ShardRole::Player, EntityId::from(player))
    }

    async fn ask(placement: &LocalPlacement, player: u64) -> String {
        let (reply, answer) = oneshot::channel();
        placement
            .tell(ShardRole::Player, Envelope::new(Ask { player, reply }))
            .await
            .unwrap();
        answer.await.unwrap()
    }

    #[tokio::test]
    async fn test_first_message_activates_and_shutdown_retires() {
        let (placement, node, journal) = setup();
        placement
            .start_region(ShardRole::Player, region(&node, &journal, false))
            .await
            .unwrap();

        assert_matches!(
            placement.resolve(&player_path(7)),
            Err(PlacementError::PathNotFound { .. })
        );

        placement
            .tell(
                ShardRole::Player,
                Envelope::new(Visit {
                    player: 7,
                    note: "hello",
                }),
            )
            .await
            .unwrap();
        assert_eq!(ask(&placement, 7).await, "hearth://game/player/7");

        let actor = placement.resolve(&player_path(7)).unwrap();
        assert_eq!(actor.path(), &player_path(7));
        assert_eq!(placement.live_actors(ShardRole::Player), 1);

        placement.shutdown().await;

        assert_eq!(
            *journal.lock(),
            vec!["7:load", "7:start", "7:visit:hello", "7:pre_stop", "7:stop"]
        );
        assert!(!actor.is_alive());
        assert!(!placement.is_hosting(ShardRole::Player));
        assert_matches!(
            placement.tell(ShardRole::Player, Envelope::new(Visit { player: 7, note: "late" })).await,
            Err(PlacementError::RegionNotStarted { .. })
        );
    }

    #[tokio::test]
    async fn test_messages_are_processed_in_order_per_actor() {
        let (placement, node, journal) = setup();
        placement
            .start_region(ShardRole::Player, region(&node, &journal, false))
            .await
            .unwrap();

        const NOTES: [&str; 4] = ["a", "b", "c", "d"];
        for note in NOTES {
            placement
                .tell(ShardRole::Player, Envelope::new(Visit { player: 1, note }))
                .await
                .unwrap();
            placement
                .tell(ShardRole::Player, Envelope::new(Visit { player: 2, note }))
                .await
                .unwrap();
        }
        ask(&placement, 1).await;
        ask(&placement, 2).await;

        let journal = journal.lock().clone();
        for player in ["1", "2"] {
            let visits: Vec<_> = journal
                .iter()
                .filter(|entry| entry.starts_with(&format!("{player}:visit:")))
                .map(|entry| entry.rsplit(':').next().unwrap_or_default().to_string())
                .collect();
            assert_eq!(visits, NOTES);
        }
        assert_eq!(placement.live_actors(ShardRole::Player), 2);
    }

    #[tokio::test]
    async fn test_unroutable_and_unknown_group() {
        let (placement, node, journal) = setup();
        placement
            .start_region(ShardRole::Player, region(&node, &journal, false))
            .await
            .unwrap();

        assert_matches!(
            placement.tell(ShardRole::Player, Envelope::new(3u32)).await,
            Err(PlacementError::UnroutableMessage { role: ShardRole::Player, message_type: "u32" })
        );
        assert_matches!(
            placement
                .tell(ShardRole::World, Envelope::new(Visit { player: 1, note: "x" }))
                .await,
            Err(PlacementError::RegionNotStarted { role: ShardRole::World })
        );
        assert_matches!(
            placement.resolve(&ActorPath::new("other", ShardRole::Player, EntityId::from(1u64))),
            Err(PlacementError::PathNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_failed_activation_is_not_registered() {
        let (placement, node, journal) = setup();
        placement
            .start_region(ShardRole::Player, region(&node, &journal, true))
            .await
            .unwrap();

        assert_matches!(
            placement
                .tell(ShardRole::Player, Envelope::new(Visit { player: 5, note: "x" }))
                .await,
            Err(PlacementError::ActivationFailed { path, .. }) if path == "hearth://game/player/5"
        );
        assert_matches!(
            placement.resolve(&player_path(5)),
            Err(PlacementError::PathNotFound { .. })
        );
        assert_eq!(placement.live_actors(ShardRole::Player), 0);

        placement.shutdown().await;
        assert_eq!(*journal.lock(), vec!["5:load"]);
    }

    /// Messages the other of players 1 and 2 while loading
    struct Neighbour {
        first: bool,
    }

    #[async_trait]
    impl Component<ActorHost> for Neighbour {
        async fn load(&self, host: &ActorHost) -> Result<(), ComponentError> {
            let (player, note) = if self.first { (2, "from 1") } else { (1, "from 2") };
            host.node()
                .tell(ShardRole::Player, Envelope::new(Visit { player, note }))
                .await
                .map_err(|err| ComponentError::failed::<Self>("neighbour unreachable").with_cause(err))
        }
    }

    #[tokio::test]
    async fn test_activation_hooks_may_message_cold_instances() {
        let (placement, node, journal) = setup();
        let tracked = journal.clone();
        let blueprint = Blueprint::new("player")
            .with(move |seed: &EntitySeed| Tracker {
                entity: seed.entity.to_string(),
                journal: tracked.clone(),
                fail_load: false,
            })
            .unwrap()
            .with(|seed: &EntitySeed| Neighbour {
                first: seed.entity.as_str() == "1",
            })
            .unwrap();
        let hosted = HostedRegion {
            extractor: extractor(),
            blueprint: Arc::new(blueprint),
            behavior: Arc::new(Visitors {
                journal: journal.clone(),
            }),
            node: Arc::downgrade(&node),
        };
        placement.start_region(ShardRole::Player, hosted).await.unwrap();

        // Player 1 activates player 2 while loading, and player 2 messages
        // player 1 before player 1 is ready.
        let visit = placement.tell(
            ShardRole::Player,
            Envelope::new(Visit {
                player: 1,
                note: "hello",
            }),
        );
        tokio::time::timeout(Duration::from_secs(5), visit)
            .await
            .expect("activation finished")
            .unwrap();
        ask(&placement, 1).await;
        ask(&placement, 2).await;

        let journal = journal.lock().clone();
        let visits_to = |player: &str| -> Vec<String> {
            journal
                .iter()
                .filter_map(|entry| entry.strip_prefix(&format!("{player}:visit:")).map(str::to_string))
                .collect()
        };
        assert_eq!(visits_to("1"), vec!["from 2", "hello"]);
        assert_eq!(visits_to("2"), vec!["from 1"]);
        assert_eq!(placement.live_actors(ShardRole::Player), 2);

        placement.shutdown().await;
    }

    #[tokio::test]
    async fn test_proxy_requires_hosted_group() {
        let (placement, node, journal) = setup();

        assert_matches!(
            placement.start_proxy(ShardRole::Player, RoleType::Gate).await,
            Err(PlacementError::StartFailed { role: ShardRole::Player, .. })
        );

        placement
            .start_region(ShardRole::Player, region(&node, &journal, false))
            .await
            .unwrap();
        placement
            .start_proxy(ShardRole::Player, RoleType::Gate)
            .await
            .unwrap();
        assert!(placement.is_proxying(ShardRole::Player));
        assert_eq!(ask(&placement, 9).await, "hearth://game/player/9");

        assert_matches!(
            placement
                .start_region(ShardRole::Player, region(&node, &journal, false))
                .await,
            Err(PlacementError::StartFailed { .. })
        );
        placement.shutdown().await;
    }
}
