//! Cancellable repeating timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sends `make()` into a channel every `period` until cancelled or dropped.
///
/// `cancel` is idempotent; several exit paths may race to call it.
#[derive(Debug)]
pub struct RepeatingTask {
    token: CancellationToken,
}

impl RepeatingTask {
    /// With `immediate`, the first tick fires right away; otherwise after one period.
    pub fn spawn<T, F>(
        period: Duration,
        immediate: bool,
        tx: mpsc::UnboundedSender<T>,
        make: F,
    ) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let first = if immediate { Instant::now() } else { Instant::now() + period };

        tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(make()).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("repeating task stopped");
        });

        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
