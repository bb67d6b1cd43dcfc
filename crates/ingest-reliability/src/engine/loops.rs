//! Periodic background loops
//!
//! Every loop first ticks one full period after start. A failing iteration
//! is logged inside the tick and the loop waits for the next one.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Spawn a named loop calling `tick` every `period` until `shutdown` fires
pub(crate) fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    trace!(loop_name = name, "Loop tick");
                    tick().await;
                }
                _ = shutdown.cancelled() => {
                    debug!(loop_name = name, "Loop: shutdown requested");
                    break;
                }
            }
        }

        debug!(loop_name = name, "Loop exited");
    })
}
