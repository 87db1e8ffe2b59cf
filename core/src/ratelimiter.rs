//! Launch pacing for probe dispatch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Token bucket refilled by a background ticker. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    sem: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

impl RateLimiter {
    pub fn new(tokens_per_sec: u32) -> Self {
        let sem = Arc::new(Semaphore::new(0));
        let sem_bg = sem.clone();
        let (period, per_tick) = refill_schedule(tokens_per_sec);
        let burst = (tokens_per_sec.max(1) as usize).min(Semaphore::MAX_PERMITS);
        let refill = tokio::spawn(async move {
            let mut t = tokio::time::interval(period);
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                // at most one second worth of tokens may pile up
                let room = burst.saturating_sub(sem_bg.available_permits());
                if room > 0 {
                    sem_bg.add_permits(per_tick.min(room));
                }
            }
        });
        RateLimiter { inner: Arc::new(Inner { sem, refill }) }
    }

    /// Wait for one token and consume it.
    pub async fn acquire(&self) {
        if let Ok(permit) = self.inner.sem.acquire().await {
            permit.forget();
        }
    }
}

/// Tick period and tokens added per tick. Rates above 1000/s tick every
/// millisecond and add several tokens at once.
fn refill_schedule(tokens_per_sec: u32) -> (Duration, usize) {
    let rate = u64::from(tokens_per_sec.max(1));
    if rate <= 1000 {
        (Duration::from_nanos(1_000_000_000 / rate), 1)
    } else {
        (Duration::from_millis(1), rate.div_ceil(1000) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn paces_acquisitions() {
        let rl = RateLimiter::new(50);
        let started = Instant::now();
        for _ in 0..5 {
            rl.acquire().await;
        }
        // five tokens at 50/s need at least four refill periods of 20ms
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn schedule_never_has_a_zero_period() {
        assert_eq!(refill_schedule(0), (Duration::from_secs(1), 1));
        assert_eq!(refill_schedule(50), (Duration::from_millis(20), 1));
        assert_eq!(refill_schedule(1000), (Duration::from_millis(1), 1));
        assert_eq!(refill_schedule(5000), (Duration::from_millis(1), 5));
        assert_eq!(refill_schedule(2_000_000_000), (Duration::from_millis(1), 2_000_000));
        assert!(!refill_schedule(u32::MAX).0.is_zero());
    }

    #[tokio::test]
    async fn very_high_rates_still_hand_out_tokens() {
        for rate in [2_000_000_000, u32::MAX] {
            let rl = RateLimiter::new(rate);
            let got = tokio::time::timeout(Duration::from_secs(2), async {
                for _ in 0..10_000 {
                    rl.acquire().await;
                }
            })
            .await;
            assert!(got.is_ok(), "rate {rate} stalled");
        }
    }

    #[tokio::test]
    async fn clones_share_the_bucket() {
        let rl = RateLimiter::new(1000);
        let other = rl.clone();
        rl.acquire().await;
        other.acquire().await;
    }
}
