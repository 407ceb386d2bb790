use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: usize,
}

/// Sliding-window limiter keyed by caller identifier.
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: usize,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RateLimiter {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window,
            enabled: true,
        }
    }

    /// Always allows, reporting the configured maximum as remaining.
    pub fn disabled(max_requests: usize) -> Self {
        RateLimiter {
            enabled: false,
            ..Self::new(max_requests, Duration::ZERO)
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts this call against `identifier` when allowed.
    pub fn check(&self, identifier: &str) -> RateDecision {
        if !self.enabled {
            return RateDecision {
                allowed: true,
                remaining: self.max_requests,
            };
        }

        let now = Instant::now();
        let mut requests = self.lock();
        let history = requests.entry(identifier.to_string()).or_default();
        history.retain(|t| now.duration_since(*t) < self.window);

        let count = history.len();
        if count >= self.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }
        history.push(now);
        RateDecision {
            allowed: true,
            remaining: self.max_requests - count - 1,
        }
    }

    /// Forget one identifier, or everyone when `None`.
    pub fn reset(&self, identifier: Option<&str>) {
        let mut requests = self.lock();
        match identifier {
            Some(id) => {
                requests.remove(id);
            }
            None => requests.clear(),
        }
    }
}
