//! # Hearth Node - Process Host
//!
//! Runs one game server node: resolves configuration, attaches global
//! components, binds actor groups through the placement layer, drives the
//! fixed-period tick loop and shuts everything down in order.
//!
//! ## Lifecycle
//!
//! ```text
//! Created → Configuring → Loading → PlacementStarting → Running → Stopping → Stopped
//! ```
//!
//! - **Configuring**: layered config resolved, configured groups picked,
//!   global components attached
//! - **Loading**: `load` on every global component
//! - **PlacementStarting**: actor groups hosted or proxied
//! - **Running**: `start` on globals, then `tick` once per period; a fatal
//!   component error from a tick or an actor ends this state
//! - **Stopping**: `pre_stop` on globals, live actors stopped
//! - **Stopped**: `stop` on globals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hearth_node::{NodeBuilder, ServerNode};
//!
//! let node = ServerNode::builder(RoleType::Home)
//!     .with_config_dir("conf")
//!     .with_global(|config| LoginTokenComponent::with_ttl(config.login.ttl()))
//!     .offer_group(ShardRole::Player, players)
//!     .build();
//!
//! let quit = node.quit_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     quit.raise();
//! });
//! node.run().await?;
//! ```

pub mod actor;
pub mod config;
pub mod context;
pub mod errors;
pub mod node;
pub mod placement;
pub mod session;
pub mod state;
pub mod ticker;

pub use actor::{ActorBehavior, ActorHost, ActorRef, EntitySeed, Envelope};
pub use config::{ConfigError, LoginConfig, NodeConfig, PlacementConfig, TickConfig};
pub use context::NodeContext;
pub use errors::NodeError;
pub use node::{NodeBuilder, ServerNode};
pub use placement::{
    typed_extractor, GroupBinding, HostedGroup, HostedRegion, LocalPlacement, PlacementError,
    PlacementService, ShardKeyExtractor,
};
pub use session::{ExceptionHandler, Session, SessionBoundary, SessionError, SessionStatus};
pub use state::NodeState;
pub use ticker::{QuitFlag, TickSchedule, TickStats};
