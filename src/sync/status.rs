use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::shared::models::constants::{
    BADGE_CLEAR_DELAY_MS, BADGE_FAILURE_COLOR, BADGE_FAILURE_TEXT, BADGE_SUCCESS_COLOR,
    BADGE_SUCCESS_TEXT,
};
use crate::shared::models::Badge;

pub trait StatusIndicator: Send + Sync {
    fn set_badge(&self, text: &str, color: &str);
}

/// Badge held in memory and served by the control API.
#[derive(Default)]
pub struct SharedBadge {
    badge: RwLock<Badge>,
}

impl SharedBadge {
    pub fn snapshot(&self) -> Badge {
        match self.badge.read() {
            Ok(badge) => badge.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StatusIndicator for SharedBadge {
    fn set_badge(&self, text: &str, color: &str) {
        debug!(text, color, "badge updated");
        let mut badge = match self.badge.write() {
            Ok(badge) => badge,
            Err(poisoned) => poisoned.into_inner(),
        };
        badge.text = text.to_string();
        badge.color = color.to_string();
    }
}

/// Projects sync outcomes onto the badge. The success mark clears itself
/// after a delay; a newer outcome cancels any pending clear.
pub struct StatusReporter {
    indicator: Arc<dyn StatusIndicator>,
    clear_after: Duration,
    generation: Arc<AtomicU64>,
    pending_clear: Mutex<Option<JoinHandle<()>>>,
}

impl StatusReporter {
    pub fn new(indicator: Arc<dyn StatusIndicator>) -> Self {
        Self::with_clear_delay(indicator, Duration::from_millis(BADGE_CLEAR_DELAY_MS))
    }

    pub fn with_clear_delay(indicator: Arc<dyn StatusIndicator>, clear_after: Duration) -> Self {
        Self {
            indicator,
            clear_after,
            generation: Arc::new(AtomicU64::new(0)),
            pending_clear: Mutex::new(None),
        }
    }

    pub fn report(&self, success: bool) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pending = match self.pending_clear.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        if !success {
            self.indicator
                .set_badge(BADGE_FAILURE_TEXT, BADGE_FAILURE_COLOR);
            return;
        }

        self.indicator
            .set_badge(BADGE_SUCCESS_TEXT, BADGE_SUCCESS_COLOR);
        let indicator = self.indicator.clone();
        let current = self.generation.clone();
        let delay = self.clear_after;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == generation {
                indicator.set_badge("", BADGE_SUCCESS_COLOR);
            }
        }));
    }
}
