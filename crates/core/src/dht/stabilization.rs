//! Stabilization run daemons to maintain dht.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::MessageHandler;

/// The stabilization runner.
/// Drives the two periodic Chord steps of one node, `stabilize` and `fix_fingers`.
#[derive(Clone)]
pub struct Stabilizer {
    handler: MessageHandler,
    stabilize_interval: Duration,
    fix_fingers_interval: Duration,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(
        handler: MessageHandler,
        stabilize_interval: Duration,
        fix_fingers_interval: Duration,
    ) -> Self {
        Self {
            handler,
            stabilize_interval,
            fix_fingers_interval,
        }
    }

    /// Run stabilization once, both steps back to back.
    /// Failures are logged, the next round works against fresh state.
    pub async fn stabilize(&self) -> Result<()> {
        tracing::debug!("STABILIZATION stabilize start");
        if let Err(e) = self.handler.stabilize().await {
            tracing::error!("[stabilize] Failed on stabilize {:?}", e);
        }
        tracing::debug!("STABILIZATION stabilize end");
        tracing::debug!("STABILIZATION fix_fingers start");
        if let Err(e) = self.handler.fix_fingers().await {
            tracing::error!("[stabilize] Failed on fix_finger {:?}", e);
        }
        tracing::debug!("STABILIZATION fix_fingers end");
        Ok(())
    }

    /// Run both timers until `shutdown` is cancelled.
    /// The timers are independent, a slow lookup in fix_fingers never delays stabilize.
    pub async fn wait(self: Arc<Self>, shutdown: CancellationToken) {
        let stabilize = async {
            let mut ticker = ticker(self.stabilize_interval);
            loop {
                ticker.tick().await;
                self.handler
                    .stabilize()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e));
            }
        };
        let fix_fingers = async {
            let mut ticker = ticker(self.fix_fingers_interval);
            loop {
                ticker.tick().await;
                self.handler
                    .fix_fingers()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to fix fingers {:?}", e));
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("stabilizer of {} stopped", self.handler.did());
            }
            _ = futures::future::join(stabilize, fix_fingers) => {}
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
