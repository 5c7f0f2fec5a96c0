use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub type TickHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A recurring platform timer. At most one is armed at a time.
pub trait TimerPort: Send {
    fn arm(&mut self, interval_minutes: u64, on_fire: TickHandler);
    fn clear(&mut self);
}

/// Timer backed by a tokio interval task. Each firing runs in its own task,
/// so clearing the timer never cancels a sync that is already running.
#[derive(Default)]
pub struct TokioTimer {
    task: Option<JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl TimerPort for TokioTimer {
    fn arm(&mut self, interval_minutes: u64, on_fire: TickHandler) {
        self.clear();
        let period = Duration::from_secs(interval_minutes.max(1).saturating_mul(60));
        info!(interval_minutes, "sync timer armed");

        self.task = Some(tokio::spawn(async move {
            // First firing is one full period away, like a browser alarm.
            let now = Instant::now();
            let Some(first) = now.checked_add(period) else {
                warn!(interval_minutes, "sync interval too large for the clock; timer idle");
                return;
            };
            let mut ticker = time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("sync timer fired");
                tokio::spawn(on_fire());
            }
        }));
    }

    fn clear(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("sync timer cleared");
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.clear();
    }
}
