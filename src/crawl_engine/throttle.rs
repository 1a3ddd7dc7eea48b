//! Pacing gate for outgoing fetches
//!
//! `ThrottleManager` enforces two admission rules at once:
//! - no more than `max_concurrent` holders at a time
//! - consecutive grants separated by at least `current_rate`
//!
//! A grant reserves its slot and its start time under the lock, then sleeps
//! outside the lock until the reserved instant. Reserving first keeps
//! concurrent acquirers from racing to the same grant time.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct ThrottleState {
    current_rate: Duration,
    active_requests: usize,
    last_grant: Option<Instant>,
    granted_total: u64,
}

/// Process-wide pacing gate shared by every URL task of a crawler.
#[derive(Debug)]
pub struct ThrottleManager {
    state: Mutex<ThrottleState>,
    min_rate: Duration,
    max_concurrent: usize,
    capacity: Notify,
}

impl ThrottleManager {
    /// Create a throttle starting at `min_rate`.
    ///
    /// `max_concurrent` is raised to 1 if zero.
    #[must_use]
    pub fn new(min_rate: Duration, max_concurrent: usize) -> Self {
        Self {
            state: Mutex::new(ThrottleState {
                current_rate: min_rate,
                active_requests: 0,
                last_grant: None,
                granted_total: 0,
            }),
            min_rate,
            max_concurrent: max_concurrent.max(1),
            capacity: Notify::new(),
        }
    }

    /// Wait for a concurrency slot and the next spacing window.
    ///
    /// The returned permit releases its slot on drop, including when the
    /// holding task is cancelled while still waiting for its grant time.
    pub async fn acquire(self: &Arc<Self>) -> ThrottlePermit {
        loop {
            let notified = self.capacity.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the await is not lost.
            notified.as_mut().enable();

            let reserved = {
                let mut state = self.state.lock();
                if state.active_requests < self.max_concurrent {
                    let now = Instant::now();
                    let grant_at = match state.last_grant {
                        Some(last) => (last + state.current_rate).max(now),
                        None => now,
                    };
                    state.active_requests += 1;
                    state.granted_total += 1;
                    state.last_grant = Some(grant_at);
                    Some((grant_at, state.active_requests))
                } else {
                    None
                }
            };

            match reserved {
                Some((grant_at, active)) => {
                    let permit = ThrottlePermit {
                        throttle: Arc::clone(self),
                        released: false,
                    };
                    let wait = grant_at.saturating_duration_since(Instant::now());
                    if !wait.is_zero() {
                        debug!("Rate limiting: waiting {:.2}s before next request", wait.as_secs_f64());
                        tokio::time::sleep_until(grant_at).await;
                    }
                    debug!("Throttle slot granted ({active}/{} active)", self.max_concurrent);
                    return permit;
                }
                None => {
                    debug!(
                        "Max concurrent requests ({}) reached, waiting for a slot",
                        self.max_concurrent
                    );
                    notified.await;
                }
            }
        }
    }

    /// Give back one concurrency slot. Prefer dropping a `ThrottlePermit`.
    pub fn release(&self) {
        {
            let mut state = self.state.lock();
            if state.active_requests == 0 {
                warn!("Throttle release called with no active requests");
                return;
            }
            state.active_requests -= 1;
        }
        self.capacity.notify_one();
    }

    /// Update the spacing used by subsequent grants, clamped to `min_rate`.
    pub fn set_rate(&self, rate: Duration) {
        let rate = rate.max(self.min_rate);
        let mut state = self.state.lock();
        if state.current_rate != rate {
            info!(
                "Throttle rate updated: {:.2}s -> {:.2}s",
                state.current_rate.as_secs_f64(),
                rate.as_secs_f64()
            );
            state.current_rate = rate;
        }
    }

    #[must_use]
    pub fn current_rate(&self) -> Duration {
        self.state.lock().current_rate
    }

    #[must_use]
    pub fn min_rate(&self) -> Duration {
        self.min_rate
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    #[must_use]
    pub fn active_requests(&self) -> usize {
        self.state.lock().active_requests
    }

    /// Total grants issued since creation
    #[must_use]
    pub fn granted_total(&self) -> u64 {
        self.state.lock().granted_total
    }
}

/// RAII slot returned by [`ThrottleManager::acquire`].
#[derive(Debug)]
pub struct ThrottlePermit {
    throttle: Arc<ThrottleManager>,
    released: bool,
}

impl ThrottlePermit {
    /// Release the slot now instead of at drop.
    pub fn release(mut self) {
        self.released = true;
        self.throttle.release();
    }
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        if !self.released {
            self.throttle.release();
        }
    }
}
