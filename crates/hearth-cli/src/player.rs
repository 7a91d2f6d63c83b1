//! Player actor group
//!
//! One actor per player, hosted on home nodes. A login begins by asking the
//! player actor for a token; the client presents that token to finish the
//! handshake, and redemption yields the locator of the actor that issued it.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::{Blueprint, Component, ComponentError, EntityId};
use hearth_login::{LoginToken, LoginTokenComponent};
use hearth_node::{
    typed_extractor, ActorBehavior, ActorHost, EntitySeed, Envelope, HostedGroup, ShardKeyExtractor,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Ask a player actor to issue a login token for itself
#[derive(Debug)]
pub struct BeginLogin {
    /// Player id, the shard key
    pub player: u64,
    /// Receives the issued token
    pub reply: oneshot::Sender<LoginToken>,
}

/// Per-player login state
#[derive(Debug, Default)]
pub struct PlayerComponent {
    last_login: Mutex<Option<LoginToken>>,
}

impl PlayerComponent {
    fn remember(&self, token: LoginToken) {
        *self.last_login.lock() = Some(token);
    }
}

#[async_trait]
impl Component<ActorHost> for PlayerComponent {
    fn name(&self) -> &'static str {
        "player"
    }

    async fn load(&self, host: &ActorHost) -> Result<(), ComponentError> {
        tracing::debug!(path = %host.path(), "player loaded");
        Ok(())
    }

    async fn pre_stop(&self, host: &ActorHost) -> Result<(), ComponentError> {
        let last = self.last_login.lock().take();
        let Some(token) = last else {
            return Ok(());
        };
        // Nobody can finish a login against a player that is going away.
        let tokens = host.node().component::<LoginTokenComponent>()?;
        if tokens.redeem(&token).is_ok() {
            tracing::debug!(path = %host.path(), "withdrew pending login token");
        }
        Ok(())
    }
}

/// Message handling of player actors
#[derive(Debug, Default)]
pub struct PlayerBehavior;

#[async_trait]
impl ActorBehavior for PlayerBehavior {
    async fn receive(&self, host: &ActorHost, message: Envelope) -> Result<(), ComponentError> {
        let login = message.downcast::<BeginLogin>().map_err(|other| {
            ComponentError::failed::<Self>(format!("unhandled message {}", other.type_name()))
        })?;

        let tokens = host.node().component::<LoginTokenComponent>()?;
        let token = tokens.issue(host.path().clone().into());
        host.component::<PlayerComponent>()?.remember(token.clone());

        if login.reply.send(token).is_err() {
            tracing::debug!(path = %host.path(), "login requester went away");
        }
        Ok(())
    }
}

/// The player group as hosted by home nodes
pub fn group() -> Result<HostedGroup, ComponentError> {
    let blueprint =
        Blueprint::<ActorHost, EntitySeed>::new("player").with(|_: &EntitySeed| PlayerComponent::default())?;
    Ok(HostedGroup::new(extractor(), blueprint, PlayerBehavior))
}

fn extractor() -> Arc<dyn ShardKeyExtractor> {
    typed_extractor(|login: &BeginLogin| EntityId::from(login.player))
}
