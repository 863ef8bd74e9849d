use crate::shipper::Shipper;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Smallest accepted flush interval.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Background task that flushes a [`Shipper`] on a fixed interval.
///
/// Flush failures inside the task are logged and swallowed; the task only
/// ends when [`FlushTimer::stop`] is called or the timer is dropped.
pub struct FlushTimer {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl FlushTimer {
    /// Spawn the timer. The first flush happens one `period` from now.
    pub fn start(shipper: Arc<Shipper>, period: Duration) -> Self {
        let period = period.max(MIN_FLUSH_INTERVAL);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("flush timer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = shipper.flush().await {
                            error!(error = %e, "periodic flush failed");
                        }
                    }
                }
            }
        });

        FlushTimer {
            token,
            handle: Some(handle),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |handle| !handle.is_finished())
    }

    /// Cancel the timer and wait for an in-flight flush to settle.
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "flush timer task panicked");
                }
            }
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
