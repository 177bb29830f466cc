//! Best-effort abuse guard for the download form.

use std::{
    collections::{HashMap, VecDeque},
    net::IpAddr,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Decides whether a client may start another download
pub trait RequestLimiter: Send + Sync {
    /// `Err` carries the time to wait before the next accepted request
    fn check(&self, client: IpAddr) -> Result<(), Duration>;
}

/// In-memory sliding window per client address.
///
/// State is lost on restart and not shared between processes.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// A limit of 0 requests disables the limiter
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> Result<(), Duration> {
        if self.max_requests == 0 {
            return Ok(());
        }

        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Forget the clients whose window is over
        hits.retain(|_, times| {
            while times
                .front()
                .is_some_and(|first| now.duration_since(*first) >= self.window)
            {
                times.pop_front();
            }
            !times.is_empty()
        });

        let times = hits.entry(client).or_default();
        if times.len() >= self.max_requests {
            let oldest = times.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        times.push_back(now);
        Ok(())
    }
}

impl RequestLimiter for SlidingWindowLimiter {
    fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.check_at(client, Instant::now())
    }
}
