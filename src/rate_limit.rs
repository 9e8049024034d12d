use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

// Per-caller window state - count and end of the current window
struct WindowEntry {
    count: u32,
    window_end: Instant,
}

/// Fixed-window request counter keyed by caller id.
///
/// Allows at most `limit` requests per caller inside a window of `window`
/// length. Window rollover is lazy: it happens on the first request after
/// the window expires, so no background ticking is needed for correctness.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: DashMap<String, WindowEntry>,
}

impl RateLimiter {
    /// `limit` of 0 is legal and means "never admit". `window` must be
    /// positive; config validation enforces that before construction.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: DashMap::new(),
        }
    }

    /// Decide whether the request identified by `caller_id` at time `now`
    /// may proceed. The caller supplies `now` so decisions are testable
    /// without a real clock.
    ///
    /// The entry guard from the map serializes concurrent calls for the
    /// same caller; different callers do not wait on each other.
    pub fn admit(&self, caller_id: &str, now: Instant) -> Decision {
        // blank ids are a contract violation of the auth layer and must
        // never occupy a window slot
        if caller_id.trim().is_empty() {
            return Decision::Rejected {
                retry_after: Duration::ZERO,
            };
        }

        let mut entry = self
            .entries
            .entry(caller_id.to_owned())
            .or_insert_with(|| WindowEntry {
                count: 0,
                window_end: now + self.window,
            });

        // the request is counted before the check, so request limit+1 is
        // the first one rejected
        entry.count = entry.count.saturating_add(1);

        if entry.count <= self.limit {
            return Decision::Allowed;
        }

        if now < entry.window_end {
            return Decision::Rejected {
                retry_after: entry.window_end - now,
            };
        }

        // window expired - this request opens a fresh one
        entry.count = 1;
        entry.window_end = now + self.window;
        Decision::Allowed
    }

    /// Drop entries whose window expired at least one full window ago.
    /// An expired window never rejects and the next request would reset it
    /// anyway, so removal cannot change any admission decision.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries.retain(|_, entry| now < entry.window_end + window);
        before.saturating_sub(self.entries.len())
    }

    /// Number of callers with live window state.
    pub fn tracked_callers(&self) -> usize {
        self.entries.len()
    }
}
