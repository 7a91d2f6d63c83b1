//! Global component owning the login token cache

use std::time::Duration;

use async_trait::async_trait;
use hearth_core::{ActorLocator, Component, ComponentError};

use crate::cache::TokenCache;
use crate::errors::LoginError;
use crate::token::LoginToken;

/// Node-wide owner of pending login tokens
///
/// Any host may issue or redeem concurrently; every tick sweeps tokens older
/// than the cache's time-to-live.
#[derive(Debug)]
pub struct LoginTokenComponent {
    cache: TokenCache,
}

impl LoginTokenComponent {
    /// Wrap an existing cache
    pub fn new(cache: TokenCache) -> Self {
        Self { cache }
    }

    /// Component on the system clock with the given token lifetime
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(TokenCache::new(ttl))
    }

    /// Issue a token for the actor holding a pending login
    pub fn issue(&self, locator: ActorLocator) -> LoginToken {
        let token = self.cache.issue(locator);
        tracing::debug!(live = self.cache.len(), "login token issued");
        token
    }

    /// Redeem a token presented by a client
    pub fn redeem(&self, token: &LoginToken) -> Result<ActorLocator, LoginError> {
        self.cache.redeem(token)
    }

    /// Underlying cache
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }
}

#[async_trait]
impl<C: ?Sized + Sync + 'static> Component<C> for LoginTokenComponent {
    fn name(&self) -> &'static str {
        "login_tokens"
    }

    async fn tick(&self, _ctx: &C) -> Result<(), ComponentError> {
        let expired = self.cache.sweep(self.cache.now_ms());
        if expired > 0 {
            tracing::debug!(expired, live = self.cache.len(), "login tokens expired");
        }
        Ok(())
    }

    async fn stop(&self, _ctx: &C) -> Result<(), ComponentError> {
        let live = self.cache.len();
        if live > 0 {
            tracing::info!(live, "dropping unredeemed login tokens at shutdown");
        }
        Ok(())
    }
}
