//! Server node: builder and lifecycle driver
//!
//! [`ServerNode::run`] walks the node through its states in order. Startup
//! failures do not skip shutdown: whatever reached `Loading` still gets
//! `pre_stop`, placement shutdown and `stop` before the original error is
//! returned.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use hearth_core::{Component, ComponentError, ComponentRegistry, Phase, RoleType, ShardRole};
use tokio::sync::watch;

use crate::config::{ConfigError, NodeConfig};
use crate::context::NodeContext;
use crate::errors::NodeError;
use crate::placement::{bind_groups, GroupBinding, HostedGroup, LocalPlacement, PlacementService};
use crate::state::NodeState;
use crate::ticker::{run_tick_loop, QuitFlag, TickStats};

/// Owner label of the global component registry
pub const GLOBAL_OWNER: &str = "global";

type GlobalCtor = Box<
    dyn FnOnce(&NodeConfig, &mut ComponentRegistry<NodeContext>) -> Result<(), ComponentError>
        + Send
        + Sync,
>;

enum ConfigSource {
    Directory(PathBuf),
    Resolved(NodeConfig),
}

/// Assembles a [`ServerNode`]
pub struct NodeBuilder {
    role: RoleType,
    config: ConfigSource,
    globals: Vec<GlobalCtor>,
    groups: Vec<GroupBinding>,
    offered: BTreeMap<ShardRole, HostedGroup>,
    placement: Option<Arc<dyn PlacementService>>,
}

impl NodeBuilder {
    /// Builder for a node of kind `role` with default configuration
    pub fn new(role: RoleType) -> Self {
        Self {
            role,
            config: ConfigSource::Resolved(NodeConfig::default()),
            globals: Vec::new(),
            groups: Vec::new(),
            offered: BTreeMap::new(),
            placement: None,
        }
    }

    /// Use an already resolved configuration
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = ConfigSource::Resolved(config);
        self
    }

    /// Resolve layered configuration from `dir` while configuring
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config = ConfigSource::Directory(dir.into());
        self
    }

    /// Attach a global component built from the resolved configuration
    ///
    /// Components are attached in call order during `Configuring`; a repeated
    /// type fails the node there.
    pub fn with_global<T, F>(mut self, ctor: F) -> Self
    where
        T: Component<NodeContext>,
        F: FnOnce(&NodeConfig) -> T + Send + Sync + 'static,
    {
        self.globals.push(Box::new(
            move |config: &NodeConfig, registry: &mut ComponentRegistry<NodeContext>| {
                registry.attach_with(|| ctor(config)).map(|_| ())
            },
        ));
        self
    }

    /// Host `role` on this node
    pub fn host_group(mut self, role: ShardRole, group: HostedGroup) -> Self {
        self.groups.push(GroupBinding::Host { role, group });
        self
    }

    /// Reach `role` through a proxy
    pub fn proxy_group(mut self, role: ShardRole) -> Self {
        self.groups.push(GroupBinding::Proxy { role });
        self
    }

    /// Make `group` available for `role` without binding it
    ///
    /// While configuring, every role listed in `placement.hosted` is hosted
    /// with its offered group and every role in `placement.proxied` is
    /// proxied. A hosted role with no offered group fails configuration.
    pub fn offer_group(mut self, role: ShardRole, group: HostedGroup) -> Self {
        self.offered.insert(role, group);
        self
    }

    /// Use `placement` instead of an in-process [`LocalPlacement`]
    pub fn with_placement(mut self, placement: Arc<dyn PlacementService>) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Finish assembly
    pub fn build(self) -> ServerNode {
        let (state, _) = watch::channel(NodeState::Created);
        ServerNode {
            role: self.role,
            config: Some(self.config),
            globals: self.globals,
            groups: self.groups,
            offered: self.offered,
            placement: self.placement,
            state,
            quit: QuitFlag::new(),
        }
    }
}

/// One game server process
pub struct ServerNode {
    role: RoleType,
    config: Option<ConfigSource>,
    globals: Vec<GlobalCtor>,
    groups: Vec<GroupBinding>,
    offered: BTreeMap<ShardRole, HostedGroup>,
    placement: Option<Arc<dyn PlacementService>>,
    state: watch::Sender<NodeState>,
    quit: QuitFlag,
}

impl ServerNode {
    /// Start assembling a node of kind `role`
    pub fn builder(role: RoleType) -> NodeBuilder {
        NodeBuilder::new(role)
    }

    /// Role this node plays
    pub fn role(&self) -> RoleType {
        self.role
    }

    /// Current state
    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    /// Receiver observing every state change
    pub fn watch_state(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// Flag that ends the tick loop when raised
    pub fn quit_handle(&self) -> QuitFlag {
        self.quit.clone()
    }

    /// Run the node until its quit flag is raised
    ///
    /// Returns tick counters on a clean shutdown. Any error means the node
    /// has already shut down and the process should exit non-zero. A fatal
    /// component error raised by a tick or an actor ends the tick loop and
    /// is returned once shutdown completes.
    pub async fn run(mut self) -> Result<TickStats, NodeError> {
        tracing::info!(role = %self.role, "node starting");
        self.advance(NodeState::Configuring)?;

        let ctx = match self.configure() {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::error!(role = %self.role, %err, "node configuration failed");
                self.advance(NodeState::Stopping)?;
                self.advance(NodeState::Stopped)?;
                return Err(err);
            }
        };

        if let Err(err) = self.boot(&ctx).await {
            tracing::error!(role = %self.role, state = %self.state(), %err, "node startup failed");
            if let Err(shutdown_err) = self.shutdown(&ctx).await {
                tracing::error!(%shutdown_err, "shutdown after failed startup reported errors");
            }
            return Err(err);
        }

        let tick_ctx = ctx.clone();
        let stats = run_tick_loop(&ctx.config().tick, &self.quit, move || {
            let ctx = tick_ctx.clone();
            tokio::spawn(async move {
                match ctx.run_global_phase(Phase::Tick).await {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => ctx.report_fatal(err.into_source()),
                    Err(err) => tracing::warn!(%err, "tick failed"),
                }
            })
        })
        .await;

        let shutdown = self.shutdown(&ctx).await;
        if let Some(fatal) = ctx.take_fatal() {
            return Err(NodeError::Component(fatal));
        }
        shutdown?;
        Ok(stats)
    }

    /// Resolve configuration, bind configured groups, attach globals, pick
    /// the placement service
    fn configure(&mut self) -> Result<Arc<NodeContext>, NodeError> {
        let config = match self.config.take() {
            Some(ConfigSource::Directory(dir)) => NodeConfig::load_layered(&dir, self.role)?,
            Some(ConfigSource::Resolved(config)) => {
                config.validate()?;
                config
            }
            None => NodeConfig::default(),
        };

        for &role in &config.placement.hosted {
            let group = self.offered.remove(&role).ok_or_else(|| {
                ConfigError::invalid(format!("{role} is configured as hosted but no group is offered"))
            })?;
            self.groups.push(GroupBinding::Host { role, group });
        }
        self.groups.extend(
            config
                .placement
                .proxied
                .iter()
                .map(|&role| GroupBinding::Proxy { role }),
        );
        self.offered.clear();

        let mut globals = ComponentRegistry::new(GLOBAL_OWNER);
        for attach in self.globals.drain(..) {
            attach(&config, &mut globals)?;
        }
        tracing::debug!(components = ?globals.names(), "global components attached");

        let placement: Arc<dyn PlacementService> = match self.placement.take() {
            Some(placement) => placement,
            None => Arc::new(LocalPlacement::from_config(&config)),
        };

        Ok(Arc::new(NodeContext::new(
            self.role,
            config,
            globals,
            placement,
            self.quit.clone(),
        )))
    }

    async fn boot(&mut self, ctx: &Arc<NodeContext>) -> Result<(), NodeError> {
        self.advance(NodeState::Loading)?;
        ctx.run_global_phase(Phase::Load).await?;

        self.advance(NodeState::PlacementStarting)?;
        bind_groups(ctx, std::mem::take(&mut self.groups)).await?;

        self.advance(NodeState::Running)?;
        ctx.run_global_phase(Phase::Start).await?;
        Ok(())
    }

    /// Stopping then Stopped; runs every step and returns the first error
    async fn shutdown(&self, ctx: &NodeContext) -> Result<(), NodeError> {
        self.advance(NodeState::Stopping)?;
        let pre_stop = ctx.run_global_phase(Phase::PreStop).await;
        if let Err(err) = &pre_stop {
            tracing::error!(%err, "pre_stop failed");
        }
        ctx.placement().shutdown().await;

        self.advance(NodeState::Stopped)?;
        let stop = ctx.run_global_phase(Phase::Stop).await;
        if let Err(err) = &stop {
            tracing::error!(%err, "stop failed");
        }

        tracing::info!(role = %self.role, "node stopped");
        pre_stop.and(stop).map_err(NodeError::from)
    }

    fn advance(&self, next: NodeState) -> Result<(), NodeError> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(NodeError::InvalidTransition { from, to: next });
        }
        self.state.send_replace(next);
        tracing::info!(role = %self.role, %from, to = %next, "node state changed");
        Ok(())
    }
}

impl fmt::Debug for ServerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerNode")
            .field("role", &self.role)
            .field("state", &self.state())
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}
