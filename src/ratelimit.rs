use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Error, Result};

/// Sliding-window admission control keyed by client identifier
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit and record a request from `key`, or reject with `RateLimited`
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    /// Purge, count and record happen under one lock so two concurrent
    /// requests can never both take the last slot.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let mut windows = self.windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let stamps = windows.entry(key.to_string()).or_default();

        while let Some(&oldest) = stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.max_requests {
            debug!("Rate limit hit for {key}: {} requests in window", stamps.len());
            return Err(Error::RateLimited {
                retry_after: self.window,
            });
        }

        stamps.push_back(now);

        // Drop idle clients so the map does not grow without bound
        let window = self.window;
        windows.retain(|_, s| s.back().is_some_and(|&last| now.saturating_duration_since(last) < window));
        Ok(())
    }

    /// Number of clients with requests inside the window
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}
