//! Login Token Cache Tests
//!
//! Covers the login handshake round trip, expiry sweeps, concurrent use of
//! one cache from many callers, and the prefix property of sweeping.
#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hearth_core::{ActorLocator, ActorPath, EntityId, ManualClock, PhysicalClock, ShardRole};
use hearth_login::token::TOKEN_EPOCH_MS;
use hearth_login::{LoginError, TokenCache, DEFAULT_TOKEN_TTL};
use proptest::prelude::*;

const T: u64 = TOKEN_EPOCH_MS + 7 * 86_400_000;

fn locator(player: u64) -> ActorLocator {
    ActorPath::new("game", ShardRole::Player, EntityId::from(player)).into()
}

fn cache_at(now_ms: u64) -> (TokenCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now_ms));
    (TokenCache::with_clock(DEFAULT_TOKEN_TTL, clock.clone()), clock)
}

#[test]
fn test_handshake_round_trip() {
    let (cache, _) = cache_at(T);

    let k1 = cache.issue(locator(100));
    assert_eq!(cache.redeem(&k1), Ok(locator(100)));
    assert_eq!(cache.redeem(&k1), Err(LoginError::RedemptionNotFound));
}

#[test]
fn test_unredeemed_token_expires_from_both_structures() {
    let (cache, _) = cache_at(T);
    let token = cache.issue(locator(100));

    cache.sweep(T + 16_000);

    assert!(!cache.contains(&token));
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.pending(), 0);
}

#[test]
fn test_redeemed_token_sweeps_cleanly() {
    let (cache, clock) = cache_at(T);
    let token = cache.issue(locator(100));

    clock.advance(Duration::from_secs(1));
    assert_eq!(cache.redeem(&token), Ok(locator(100)));

    assert_eq!(cache.sweep(T + 16_000), 0);
    assert_eq!(cache.pending(), 0);
    assert_eq!(cache.redeem(&token), Err(LoginError::RedemptionNotFound));
}

#[test]
fn test_unknown_token_is_not_found() {
    let (cache, _) = cache_at(T);
    let stranger = hearth_login::LoginToken::new("12345");
    assert_eq!(cache.redeem(&stranger), Err(LoginError::RedemptionNotFound));
    assert!(!LoginError::RedemptionNotFound.is_fatal());
}

#[test]
fn test_concurrent_issue_redeem_and_sweep() {
    let (cache, clock) = cache_at(T);
    let cache = Arc::new(cache);

    let issuers: Vec<_> = (0..8u64)
        .map(|worker| {
            let cache = cache.clone();
            thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..200u64 {
                    let player = worker * 1_000 + i;
                    let token = cache.issue(locator(player));
                    if i % 2 == 0 {
                        assert_eq!(cache.redeem(&token), Ok(locator(player)));
                    } else {
                        kept.push(token);
                    }
                }
                kept
            })
        })
        .collect();

    let sweeper = {
        let cache = cache.clone();
        thread::spawn(move || {
            for _ in 0..100 {
                // Nothing is old enough yet; sweeping must not disturb live tokens.
                assert_eq!(cache.sweep(T + 1_000), 0);
            }
        })
    };

    let mut kept = Vec::new();
    for issuer in issuers {
        kept.extend(issuer.join().unwrap());
    }
    sweeper.join().unwrap();

    let unique: HashSet<_> = kept.iter().map(|t| t.as_str().to_string()).collect();
    assert_eq!(unique.len(), kept.len());
    assert_eq!(cache.len(), kept.len());
    assert_eq!(cache.pending(), 8 * 200);

    clock.advance(Duration::from_secs(20));
    assert_eq!(cache.sweep(clock.now_ms()), kept.len());
    assert!(cache.is_empty());
    assert_eq!(cache.pending(), 0);
}

proptest! {
    /// Property: sweep removes exactly the prefix issued at or before now - ttl
    #[test]
    fn prop_sweep_removes_exact_expired_prefix(
        gaps in prop::collection::vec(0u64..4_000, 1..40),
        redeemed in prop::collection::vec(any::<bool>(), 40),
        offset in 0u64..60_000,
    ) {
        let (cache, clock) = cache_at(T);
        let mut issued = Vec::new();
        let mut at = T;
        for (i, gap) in gaps.iter().enumerate() {
            at += gap;
            clock.set(at);
            let token = cache.issue(locator(i as u64));
            if redeemed[i] {
                cache.redeem(&token).unwrap();
            }
            issued.push((at, token, redeemed[i]));
        }

        let now = T + offset;
        let expired = cache.sweep(now);

        let mut expected_expired = 0;
        let mut expected_pending = 0;
        for (issued_at, token, was_redeemed) in &issued {
            let stale = issued_at + 15_000 <= now;
            if stale {
                prop_assert!(!cache.contains(token));
                if !was_redeemed {
                    expected_expired += 1;
                }
            } else {
                expected_pending += 1;
                prop_assert_eq!(cache.contains(token), !was_redeemed);
            }
        }
        prop_assert_eq!(expired, expected_expired);
        prop_assert_eq!(cache.pending(), expected_pending);
    }
}
