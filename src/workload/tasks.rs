//! Task bodies used by the probes.

use rand::Rng;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::dispatcher::TaskContext;

/// `base` plus a random extra of up to `jitter`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}

/// Sleep for the whole duration, ignoring cancellation.
pub async fn stubborn_sleep(duration: Duration) -> Result<(), Infallible> {
    time::sleep(duration).await;
    Ok(())
}

/// Sleep unless the caller gives up first.
pub async fn cooperative_sleep(ctx: TaskContext, duration: Duration) -> Result<(), Infallible> {
    if ctx.checkpoint(time::sleep(duration)).await.is_none() {
        tracing::trace!(task_id = %ctx.id(), "Sleep cut short by cancellation");
    }
    Ok(())
}

/// Tracks how many instrumented tasks are running and the highest count seen.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` while counted as running.
    pub async fn occupy(self: Arc<Self>, duration: Duration) -> Result<(), Infallible> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        time::sleep(duration).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        let base = Duration::from_millis(10);
        for _ in 0..100 {
            let d = jittered(base, Duration::from_millis(5));
            assert!(d >= base && d <= Duration::from_millis(15));
        }
        assert_eq!(jittered(base, Duration::ZERO), base);
    }

    #[tokio::test]
    async fn gauge_records_peak() {
        let gauge = Arc::new(ConcurrencyGauge::default());
        let a = tokio::spawn(gauge.clone().occupy(Duration::from_millis(30)));
        let b = tokio::spawn(gauge.clone().occupy(Duration::from_millis(30)));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(gauge.peak(), 2);
        assert_eq!(gauge.running(), 0);
    }
}
