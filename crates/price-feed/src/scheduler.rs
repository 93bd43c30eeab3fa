//! Fast/slow periodic cadences
//!
//! Each cadence is one task that runs its ticks back to back, so a tick never
//! starts before the previous one of the same cadence finished. Both tasks
//! share one shutdown signal and are stopped together.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Work driven by the scheduler
#[async_trait]
pub trait ScheduledWork: Send + Sync + 'static {
    /// Hot-pair refresh and source liveness tally
    async fn fast_tick(&self);

    /// Cache expiry sweep and capacity eviction
    async fn slow_tick(&self);
}

pub struct UpdateScheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl UpdateScheduler {
    /// Spawn both cadences; the first tick of each fires one period after start
    pub fn start<W: ScheduledWork>(work: Arc<W>, fast: Duration, slow: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let fast_work = Arc::clone(&work);
        let fast_handle = spawn_cadence("fast", fast, shutdown_rx.clone(), move || {
            let work = Arc::clone(&fast_work);
            async move { work.fast_tick().await }
        });

        let slow_handle = spawn_cadence("slow", slow, shutdown_rx, move || {
            let work = Arc::clone(&work);
            async move { work.slow_tick().await }
        });

        info!("Scheduler started (fast {:?}, slow {:?})", fast, slow);

        Self {
            shutdown,
            handles: vec![fast_handle, slow_handle],
        }
    }

    /// Signal both cadences and wait for them; an in-flight tick finishes first
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Scheduler task panicked: {}", e);
                }
            }
        }

        info!("Scheduler stopped");
    }

    pub fn is_active(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn spawn_cadence<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    tick().await;
                    debug!("{} tick done", name);
                }
            }
        }

        debug!("{} cadence stopped", name);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWork {
        fast: AtomicUsize,
        slow: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fast_delay: Duration,
    }

    #[async_trait]
    impl ScheduledWork for CountingWork {
        async fn fast_tick(&self) {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if !self.fast_delay.is_zero() {
                tokio::time::sleep(self.fast_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.fast.fetch_add(1, Ordering::SeqCst);
        }

        async fn slow_tick(&self) {
            self.slow.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadences_tick_independently() {
        let work = Arc::new(CountingWork::default());
        let scheduler = UpdateScheduler::start(
            Arc::clone(&work),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        assert_eq!(work.fast.load(Ordering::SeqCst), 10);
        assert_eq!(work.slow.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_never_overlap() {
        let work = Arc::new(CountingWork {
            fast_delay: Duration::from_millis(2_500),
            ..Default::default()
        });
        let scheduler = UpdateScheduler::start(
            Arc::clone(&work),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_secs(20)).await;

        assert!(work.fast.load(Ordering::SeqCst) >= 2);
        assert_eq!(work.max_in_flight.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_stop() {
        let work = Arc::new(CountingWork::default());
        let scheduler = UpdateScheduler::start(
            Arc::clone(&work),
            Duration::from_secs(1),
            Duration::from_secs(2),
        );

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(scheduler.is_active());
        scheduler.stop().await;

        let fast = work.fast.load(Ordering::SeqCst);
        let slow = work.slow.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(work.fast.load(Ordering::SeqCst), fast);
        assert_eq!(work.slow.load(Ordering::SeqCst), slow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_tick() {
        let work = Arc::new(CountingWork {
            fast_delay: Duration::from_secs(3),
            ..Default::default()
        });
        let scheduler = UpdateScheduler::start(
            Arc::clone(&work),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );

        // First fast tick starts at t=1s and runs until t=4s
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(work.in_flight.load(Ordering::SeqCst), 1);

        scheduler.stop().await;

        assert_eq!(work.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(work.fast.load(Ordering::SeqCst), 1);
    }
}
