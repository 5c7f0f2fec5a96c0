use tracing::{debug, info};

use super::timer::{TickHandler, TimerPort};
use crate::shared::Configuration;

/// What `reconcile` did to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Unchanged,
    Cleared,
    Armed { interval_minutes: u64 },
}

/// Keeps at most one recurring timer consistent with the configuration.
pub struct Scheduler {
    timer: Box<dyn TimerPort>,
    on_tick: TickHandler,
}

impl Scheduler {
    pub fn new(timer: Box<dyn TimerPort>, on_tick: TickHandler) -> Self {
        Self { timer, on_tick }
    }

    /// Startup path: arm when auto sync is on and run one sync right away
    /// instead of waiting for the first tick.
    pub async fn initialize(&mut self, config: &Configuration) {
        if !config.auto_sync {
            info!("auto sync disabled; timer not armed");
            return;
        }
        self.arm(config);
        (self.on_tick)().await;
    }

    pub fn reconcile(&mut self, old: &Configuration, new: &Configuration) -> Reconciliation {
        match (old.auto_sync, new.auto_sync) {
            (true, false) => {
                self.timer.clear();
                Reconciliation::Cleared
            }
            (false, true) => self.arm(new),
            (true, true) if old.sync_interval_minutes != new.sync_interval_minutes => {
                self.arm(new)
            }
            _ => {
                debug!("schedule unchanged");
                Reconciliation::Unchanged
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.timer.clear();
    }

    fn arm(&mut self, config: &Configuration) -> Reconciliation {
        let interval_minutes = config.effective_interval_minutes();
        self.timer.clear();
        self.timer.arm(interval_minutes, self.on_tick.clone());
        Reconciliation::Armed { interval_minutes }
    }
}
