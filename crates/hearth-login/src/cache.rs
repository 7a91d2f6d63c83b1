//! Expiring login token cache
//!
//! Tokens live in one ordered map keyed by [`TokenId`] plus a token index
//! holding the pending locator. Redemption only touches the index, so the
//! common path is a single hash lookup; the ordered entry is left behind for
//! the sweep. Because ids sort by issuance time, a sweep only ever walks the
//! expired prefix of the ordered map.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` because:
//! 1. Issue and redeem are O(1) amortised; sweep is O(expired prefix)
//! 2. Lock is never held across `.await` points
//! 3. No I/O inside lock scope
//!
//! # Collision retry
//!
//! Issuance redraws while the candidate collides with a live token. The
//! retry is not capped: with a 64-bit draw and a small live set the chance
//! of even a second draw is negligible, and a cap would turn collision
//! pressure into spurious issuance failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use hearth_core::{ActorLocator, PhysicalClock, SystemClock};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::errors::LoginError;
use crate::token::{LoginToken, TokenId, TokenIdGenerator};

/// How long an unredeemed token stays valid
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15);

struct Pending {
    id: TokenId,
    locator: ActorLocator,
}

struct CacheState {
    by_id: BTreeMap<TokenId, LoginToken>,
    live: HashMap<LoginToken, Pending>,
    ids: TokenIdGenerator,
    rng: Box<dyn RngCore + Send>,
}

/// Concurrency-safe cache of short-lived login tokens
pub struct TokenCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    clock: Arc<dyn PhysicalClock>,
}

impl TokenCache {
    /// Create a cache on the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache reading issuance time from `clock`
    pub fn with_clock(ttl: Duration, clock: Arc<dyn PhysicalClock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                by_id: BTreeMap::new(),
                live: HashMap::new(),
                ids: TokenIdGenerator::new(),
                rng: Box::new(StdRng::from_entropy()),
            }),
            ttl,
            clock,
        }
    }

    /// Replace the token source
    pub fn with_rng(self, rng: impl RngCore + Send + 'static) -> Self {
        self.state.lock().rng = Box::new(rng);
        self
    }

    /// Issue a fresh token for `locator`
    pub fn issue(&self, locator: ActorLocator) -> LoginToken {
        let mut state = self.state.lock();
        let token = loop {
            let candidate = LoginToken::from_random(state.rng.next_u64());
            if !state.live.contains_key(&candidate) {
                break candidate;
            }
        };

        let id = state.ids.next_id(self.clock.now_ms());
        state.by_id.insert(id, token.clone());
        state.live.insert(token.clone(), Pending { id, locator });
        token
    }

    /// Consume `token`, returning the locator it was issued for
    pub fn redeem(&self, token: &LoginToken) -> Result<ActorLocator, LoginError> {
        self.state
            .lock()
            .live
            .remove(token)
            .map(|pending| pending.locator)
            .ok_or(LoginError::RedemptionNotFound)
    }

    /// Drop every entry issued at or before `now_ms - ttl`
    ///
    /// Returns how many of the dropped tokens had never been redeemed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let mut guard = self.state.lock();
        let CacheState { by_id, live, .. } = &mut *guard;

        let mut expired = 0;
        while let Some(oldest) = by_id.first_entry() {
            if oldest.key().issued_at_ms().saturating_add(ttl_ms) > now_ms {
                break;
            }
            let (id, token) = oldest.remove_entry();
            // A redeemed token string may have been issued again under a newer id.
            if live.get(&token).is_some_and(|pending| pending.id == id) {
                live.remove(&token);
                expired += 1;
            }
        }
        expired
    }

    /// Current time on the cache's clock
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Whether `token` is live
    pub fn contains(&self, token: &LoginToken) -> bool {
        self.state.lock().live.contains_key(token)
    }

    /// Number of live (issued, unredeemed, unexpired) tokens
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Returns true if no token is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ordered entries still awaiting a sweep, redeemed or not
    pub fn pending(&self) -> usize {
        self.state.lock().by_id.len()
    }

    /// Token time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokenCache")
            .field("live", &state.live.len())
            .field("pending", &state.by_id.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
