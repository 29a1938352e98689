//! Sliding-window admission control
//!
//! Admission is evaluated per `(route, principal)` key against the
//! route's policy. The window is a trailing interval: timestamps older
//! than the window width are pruned before counting and never count
//! toward the limit. Denied calls do not mutate window state.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;
use voyage_foundation::{RateLimitConfig, RoutePolicy};

/// Admission key: route plus the caller identity (user id or source
/// address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub route_id: String,
    pub principal: String,
}

impl RateLimitKey {
    pub fn new(route_id: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            principal: principal.into(),
        }
    }
}

/// Admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Time until a slot frees up (denials only; always positive).
    pub retry_after: Option<Duration>,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    fn denied(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }

    /// Retry-after rounded up to whole seconds (0 when allowed).
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after
            .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0))
            .unwrap_or(0)
    }
}

/// Sliding-window rate limiter.
///
/// The limiter is threshold-agnostic: it evaluates whatever policy
/// table it is given. Routes without an explicit policy fall back to
/// the configured default policy. `admit` performs no I/O and returns
/// near-instantly; a single mutex over the window table is sufficient
/// because the critical section is a deque prune plus one push.
pub struct RateLimiter {
    policies: HashMap<String, RoutePolicy>,
    default_policy: RoutePolicy,
    windows: Mutex<HashMap<RateLimitKey, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Build a limiter from route policy configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            policies: config.routes,
            default_policy: config.default_policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Policy in effect for a route.
    pub fn policy_for(&self, route_id: &str) -> RoutePolicy {
        self.policies
            .get(route_id)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Evaluate admission for a key, recording the timestamp iff
    /// admitted. Two concurrent calls for the same key can never both
    /// claim the last remaining slot: the check and the record happen
    /// under one lock.
    pub fn admit(&self, key: &RateLimitKey) -> Admission {
        self.admit_at(key, Instant::now())
    }

    fn admit_at(&self, key: &RateLimitKey, now: Instant) -> Admission {
        let policy = self.policy_for(&key.route_id);
        let window = policy.window();

        let mut windows = self.windows.lock();
        let entries = windows.entry(key.clone()).or_default();

        // Age out entries that left the trailing window.
        while let Some(front) = entries.front() {
            if now.duration_since(*front) >= window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() < policy.max_requests as usize {
            entries.push_back(now);
            return Admission::allowed();
        }

        // Full window: deny without touching state. The oldest entry is
        // strictly inside the window, so retry_after is positive.
        let oldest = *entries.front().unwrap_or(&now);
        let retry_after = window - now.duration_since(oldest);
        debug!(
            "Rate limit denied for {}/{} (retry after {:?})",
            key.route_id, key.principal, retry_after
        );
        Admission::denied(retry_after)
    }

    /// Drop keys whose every entry has aged out of its window. Window
    /// state otherwise expires lazily on access; this sweep bounds
    /// memory for keys that stop arriving.
    pub fn purge_expired(&self) {
        let mut windows = self.windows.lock();
        windows.retain(|key, entries| {
            let window = self
                .policies
                .get(&key.route_id)
                .copied()
                .unwrap_or(self.default_policy)
                .window();
            let now = Instant::now();
            !entries
                .iter()
                .all(|t| now.duration_since(*t) >= window)
        });
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}
