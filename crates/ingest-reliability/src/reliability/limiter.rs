//! Token bucket admission control
//!
//! A non-blocking limiter: callers ask for tokens and get an immediate yes or
//! no. The ceiling (tokens per minute) can be changed at runtime by the
//! health loop; the burst capacity is fixed at construction.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
struct BucketState {
    ceiling: u32,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    /// Lazy refill; elapsed time is consumed exactly once per call
    fn refill(&mut self, now: Instant, burst_capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(burst_capacity);
        self.last_refill = now;
    }
}

/// Token bucket limiter with an adjustable ceiling
///
/// # Example
///
/// ```
/// use ingest_reliability::TokenBucketLimiter;
///
/// let limiter = TokenBucketLimiter::new(60, 10);
/// assert!(limiter.acquire(10));
/// assert!(!limiter.acquire(1));
/// ```
#[derive(Debug)]
pub struct TokenBucketLimiter {
    burst_capacity: u32,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Create a full bucket with `ceiling` tokens/minute and `burst_capacity` cap
    pub fn new(ceiling: u32, burst_capacity: u32) -> Self {
        Self::new_at(ceiling, burst_capacity, Instant::now())
    }

    pub(crate) fn new_at(ceiling: u32, burst_capacity: u32, now: Instant) -> Self {
        Self {
            burst_capacity,
            state: Mutex::new(BucketState {
                ceiling,
                refill_per_sec: per_second(ceiling),
                tokens: burst_capacity as f64,
                last_refill: now,
            }),
        }
    }

    /// Try to take `n` tokens without blocking
    pub fn acquire(&self, n: u32) -> bool {
        self.acquire_at(n, Instant::now())
    }

    pub(crate) fn acquire_at(&self, n: u32, now: Instant) -> bool {
        if n > self.burst_capacity {
            return false;
        }

        let mut state = self.state.lock();
        state.refill(now, self.burst_capacity as f64);

        let wanted = n as f64;
        if state.tokens >= wanted {
            state.tokens -= wanted;
            true
        } else {
            false
        }
    }

    /// Replace the ceiling; current tokens are left as they are
    pub fn adjust_ceiling(&self, new_ceiling: u32) {
        let mut state = self.state.lock();
        if state.ceiling != new_ceiling {
            debug!(from = state.ceiling, to = new_ceiling, "Adjusting rate ceiling");
        }
        state.ceiling = new_ceiling;
        state.refill_per_sec = per_second(new_ceiling);
    }

    /// Current ceiling in tokens per minute
    pub fn ceiling(&self) -> u32 {
        self.state.lock().ceiling
    }

    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }

    /// Refill rate derived from the ceiling
    pub fn refill_rate_per_sec(&self) -> f64 {
        self.state.lock().refill_per_sec
    }

    /// Tokens available right now (performs a refill)
    pub fn available_tokens(&self) -> f64 {
        self.available_tokens_at(Instant::now())
    }

    pub(crate) fn available_tokens_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.refill(now, self.burst_capacity as f64);
        state.tokens
    }

    /// Token count as of the last refill, without refilling
    #[cfg(test)]
    fn stored_tokens(&self) -> f64 {
        self.state.lock().tokens
    }
}

fn per_second(ceiling: u32) -> f64 {
    ceiling as f64 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_starts_full() {
        let limiter = TokenBucketLimiter::new(100, 50);
        assert_eq!(limiter.stored_tokens(), 50.0);
        assert_eq!(limiter.ceiling(), 100);
    }

    #[test]
    fn test_acquire_reduces_by_exactly_n() {
        let t0 = Instant::now();
        for n in [1u32, 7, 25, 50] {
            let limiter = TokenBucketLimiter::new_at(100, 50, t0);
            assert!(limiter.acquire_at(n, t0));
            assert_eq!(limiter.stored_tokens(), 50.0 - n as f64);
        }
    }

    #[test]
    fn test_full_burst_succeeds_exactly_once() {
        let t0 = Instant::now();
        let limiter = TokenBucketLimiter::new_at(100, 50, t0);
        assert!(limiter.acquire_at(50, t0));
        assert!(!limiter.acquire_at(50, t0));
    }

    #[test]
    fn test_over_burst_always_rejected() {
        let t0 = Instant::now();
        let limiter = TokenBucketLimiter::new_at(6000, 10, t0);

        assert!(!limiter.acquire_at(11, t0));
        assert_eq!(limiter.stored_tokens(), 10.0);

        limiter.adjust_ceiling(60_000);
        assert!(!limiter.acquire_at(11, t0 + Duration::from_secs(3600)));
        assert_eq!(limiter.stored_tokens(), 10.0);
    }

    #[test]
    fn test_refill_after_two_seconds() {
        let t0 = Instant::now();
        let limiter = TokenBucketLimiter::new_at(60, 10, t0);

        assert!(limiter.acquire_at(10, t0));
        let tokens = limiter.available_tokens_at(t0 + Duration::from_secs(2));
        assert!((tokens - 2.0).abs() < 0.1, "expected ~2.0, got {tokens}");
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let t0 = Instant::now();
        let limiter = TokenBucketLimiter::new_at(60, 10, t0);
        assert!(limiter.acquire_at(5, t0));
        let tokens = limiter.available_tokens_at(t0 + Duration::from_secs(600));
        assert_eq!(tokens, 10.0);
    }

    #[test]
    fn test_adjust_ceiling_keeps_tokens() {
        let t0 = Instant::now();
        let limiter = TokenBucketLimiter::new_at(100, 50, t0);
        assert!(limiter.acquire_at(20, t0));

        assert!((limiter.refill_rate_per_sec() - 100.0 / 60.0).abs() < f64::EPSILON);
        limiter.adjust_ceiling(200);
        assert!((limiter.refill_rate_per_sec() - 200.0 / 60.0).abs() < f64::EPSILON);
        assert_eq!(limiter.stored_tokens(), 30.0);
        assert_eq!(limiter.ceiling(), 200);
    }

    #[test]
    fn test_rejection_leaves_state_unchanged() {
        let t0 = Instant::now();
        let limiter = TokenBucketLimiter::new_at(60, 5, t0);
        assert!(limiter.acquire_at(4, t0));
        assert!(!limiter.acquire_at(2, t0));
        assert_eq!(limiter.stored_tokens(), 1.0);
    }

    #[test]
    fn test_concurrent_acquire_never_overspends() {
        // Refill of 1 token/min is negligible over the test's lifetime
        let limiter = Arc::new(TokenBucketLimiter::new(1, 40));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.acquire(1)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 40);
    }
}
