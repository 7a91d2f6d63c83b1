//! Fixed-period tick loop
//!
//! The loop revisits its schedule every poll interval. On each revisit it
//! checks the quit flag, then asks [`TickSchedule`] whether a tick is due.
//! A due tick is spawned as its own task so the quit check never waits on
//! tick work. If the previous tick task is still running the due tick is
//! skipped, but the schedule still advances.
//!
//! The schedule advances `next_due` by exactly one period per due tick and
//! never resamples it from the current time, so the nominal rate does not
//! drift. After a stall one tick fires for the whole stall: slots that were
//! already overdue when it fired are dropped on the next revisit instead of
//! firing back to back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::TickConfig;

/// Drift-free tick schedule on the monotonic clock
#[derive(Debug, Clone)]
pub struct TickSchedule {
    period: Duration,
    next_due: Instant,
    last_fired: Option<Instant>,
    coalesced: u64,
}

impl TickSchedule {
    /// Schedule whose first tick is due one period after `start`
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            period,
            next_due: start + period,
            last_fired: None,
            coalesced: 0,
        }
    }

    /// Returns true if a tick is due at `now`, advancing by one period if so
    pub fn poll(&mut self, now: Instant) -> bool {
        if let Some(fired_at) = self.last_fired {
            while self.next_due <= fired_at {
                self.next_due += self.period;
                self.coalesced += 1;
            }
        }
        if now < self.next_due {
            return false;
        }
        self.next_due += self.period;
        self.last_fired = Some(now);
        true
    }

    /// Slot following the last due tick
    ///
    /// Right after a late tick this may already be in the past; the next
    /// [`poll`](Self::poll) drops it as coalesced.
    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Overdue slots folded into an earlier tick
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Nominal period
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Shared flag asking the node to leave its tick loop
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    /// A lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the node to stop; takes effect on the next revisit
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag was raised
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters reported when the tick loop exits
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks spawned
    pub fired: u64,
    /// Due ticks skipped because the previous one was still running
    pub skipped: u64,
    /// Periods missed during a stall and folded into one tick
    pub coalesced: u64,
}

/// Run until `quit` is raised, spawning one tick task per due period
///
/// Waits for the in-flight tick, if any, before returning.
pub(crate) async fn run_tick_loop<F>(config: &TickConfig, quit: &QuitFlag, mut spawn_tick: F) -> TickStats
where
    F: FnMut() -> JoinHandle<()>,
{
    let mut revisit = tokio::time::interval(config.poll());
    revisit.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut schedule = TickSchedule::new(Instant::now(), config.period());
    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut stats = TickStats::default();

    tracing::info!(period_ms = config.period_ms, poll_ms = config.poll_ms, "tick loop started");

    loop {
        revisit.tick().await;
        if quit.is_raised() {
            break;
        }
        if !schedule.poll(Instant::now()) {
            continue;
        }
        if in_flight.as_ref().is_some_and(|task| !task.is_finished()) {
            stats.skipped += 1;
            tracing::debug!(skipped = stats.skipped, "previous tick still running, skipping");
            continue;
        }
        stats.fired += 1;
        in_flight = Some(spawn_tick());
    }

    if let Some(task) = in_flight.take() {
        if let Err(err) = task.await {
            tracing::warn!(%err, "tick task ended abnormally");
        }
    }

    stats.coalesced = schedule.coalesced();
    tracing::info!(
        fired = stats.fired,
        skipped = stats.skipped,
        coalesced = stats.coalesced,
        "tick loop stopped"
    );
    stats
}
