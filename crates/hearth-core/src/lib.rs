//! # Hearth Core - Components and Lifecycle
//!
//! Shared building blocks for Hearth game server nodes.
//!
//! ## Purpose
//!
//! - Typed component registry attached to a host (actor instance or process)
//! - Component blueprints: typed factory registries instantiated per host
//! - Lifecycle phase fan-out in attachment order
//! - Roles, actor addresses and clocks shared by every other crate
//!
//! ## What Does NOT Belong Here
//!
//! - Process state machine and tick loop (belong in `hearth-node`)
//! - Placement of actor groups (belongs in `hearth-node`)
//! - Login handshake state (belongs in `hearth-login`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hearth_core::{Component, ComponentRegistry, Phase, run_phase};
//!
//! let mut registry = ComponentRegistry::new("node");
//! registry.attach(Inventory::default())?;
//! registry.attach(Mailroom::default())?;
//!
//! run_phase(&registry, Phase::Load, &ctx).await?;
//! let inventory = registry.get::<Inventory>()?;
//! ```

pub mod address;
pub mod component;
pub mod errors;
pub mod lifecycle;
pub mod role;
pub mod time;

pub use address::{ActorLocator, ActorPath, AddressError, EntityId};
pub use component::{Blueprint, Component, ComponentRegistry};
pub use errors::{ComponentError, LifecycleError};
pub use lifecycle::{run_phase, Phase};
pub use role::{RoleType, ShardRole};
pub use time::{ManualClock, PhysicalClock, SystemClock};
