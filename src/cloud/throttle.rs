use log::trace;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/**
 * Spaces outbound calls by a fixed minimum interval.
 *
 * Callers queue on a fair mutex, so permits are handed out in arrival order.
 * The permit holder sleeps until its slot while still holding the lock, which
 * keeps later callers waiting behind it without blocking other tasks.
 */
pub struct Throttle {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspend until the caller may issue its call
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last_grant = self.last_grant.lock().await;
        if let Some(previous) = *last_grant {
            let next_slot = previous + self.interval;
            if next_slot > Instant::now() {
                trace!("Throttled until next slot");
                sleep_until(next_slot).await;
            }
        }
        *last_grant = Some(Instant::now());
    }
}
