use ahash::AHashMap as HashMap;
use std::hash::Hash;
use tokio::time::{Duration, Instant};

/// Computes how long a failed item must wait before it is retried.
///
/// The delay is the larger of a per-item exponential back-off and the wait imposed by a token
/// bucket shared by all items, which bounds the overall retry rate.
#[derive(Debug)]
pub struct RateLimiter<T> {
    failures: HashMap<T, u32>,
    base_delay: Duration,
    max_delay: Duration,
    bucket: TokenBucket,
}

#[derive(Debug)]
struct TokenBucket {
    qps: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);
const DEFAULT_QPS: f64 = 10.0;
const DEFAULT_BURST: u32 = 100;

// === impl RateLimiter ===

impl<T: Eq + Hash + Clone> RateLimiter<T> {
    pub fn new(base_delay: Duration, max_delay: Duration, qps: f64, burst: u32) -> Self {
        Self {
            failures: HashMap::new(),
            base_delay,
            max_delay,
            bucket: TokenBucket::new(qps, burst),
        }
    }

    /// Records a failure for `item` and returns how long it should wait.
    pub fn when(&mut self, item: &T) -> Duration {
        let backoff = self.backoff(item);
        let wait = self.bucket.reserve(Instant::now());
        backoff.max(wait)
    }

    pub fn forget(&mut self, item: &T) {
        self.failures.remove(item);
    }

    pub fn retries(&self, item: &T) -> u32 {
        self.failures.get(item).copied().unwrap_or(0)
    }

    fn backoff(&mut self, item: &T) -> Duration {
        let failures = self.failures.entry(item.clone()).or_default();
        let exp = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exp)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl<T: Eq + Hash + Clone> Default for RateLimiter<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_QPS, DEFAULT_BURST)
    }
}

// === impl TokenBucket ===

impl TokenBucket {
    fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    /// Takes a token, returning how long the caller must wait for it to become available.
    ///
    /// The balance may go negative; each reservation then waits behind the ones before it.
    fn reserve(&mut self, now: Instant) -> Duration {
        if self.qps <= 0.0 {
            return Duration::ZERO;
        }

        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.qps).min(self.burst);
        self.last = now;
        self.tokens -= 1.0;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-self.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }
}
