//! # Hearth Login - Expiring Login Tokens
//!
//! A client logging in is handed a short-lived token that correlates its
//! next connection with the actor holding its pending session. This crate
//! owns those tokens.
//!
//! ## Key Components
//!
//! - **TokenCache**: issues, redeems and expires tokens under one lock
//! - **TokenId**: issuance-ordered id; ascending ids mean ascending issue time
//! - **LoginTokenComponent**: global component sweeping the cache every tick
//!
//! ## Usage
//!
//! ```rust,ignore
//! let tokens = node.component::<LoginTokenComponent>()?;
//! let token = tokens.issue(ActorLocator::from(player_path));
//! // ... the client reconnects with `token`
//! let locator = tokens.redeem(&token)?;
//! ```

pub mod cache;
pub mod component;
pub mod errors;
pub mod token;

pub use cache::{TokenCache, DEFAULT_TOKEN_TTL};
pub use component::LoginTokenComponent;
pub use errors::LoginError;
pub use token::{LoginToken, TokenId, TokenIdGenerator};
