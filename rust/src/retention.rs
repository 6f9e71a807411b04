//! Data-retention reminder: when to prompt, and what the user picked.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{DiagError, Result};
use crate::prefs::KeyValueStore;

pub const KEY_RETENTION_DAYS: &str = "retention_days";
pub const KEY_REMINDER_SHOWN: &str = "retention_reminder_shown";
pub const KEY_FIRST_SEEN_DAY: &str = "retention_first_seen_day";

pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_REMIND_AFTER_DAYS: u32 = 3;
pub const RETENTION_CHOICES: &[u32] = &[7, 30, 90, 365];

/// Days since the Unix epoch, UTC.
pub fn epoch_day_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() / 86_400) as i64)
        .unwrap_or(0)
}

pub struct RetentionReminder {
    store: Arc<dyn KeyValueStore>,
    remind_after_days: u32,
}

impl RetentionReminder {
    pub fn new(store: Arc<dyn KeyValueStore>, remind_after_days: u32) -> Self {
        Self {
            store,
            remind_after_days,
        }
    }

    /// Whether the reminder dialog should be presented on `today`.
    ///
    /// The first call stamps the first-seen day. Once acknowledged, never
    /// shows again.
    pub fn should_show(&self, today: i64) -> Result<bool> {
        if self.store.get_bool(KEY_REMINDER_SHOWN) {
            return Ok(false);
        }
        let first_seen = match self.store.get_i64(KEY_FIRST_SEEN_DAY) {
            Some(day) => day,
            None => {
                self.store.set(KEY_FIRST_SEEN_DAY, &today.to_string())?;
                today
            }
        };
        Ok(today.saturating_sub(first_seen) >= i64::from(self.remind_after_days))
    }

    /// Dismiss the reminder, optionally storing a new retention period.
    pub fn acknowledge(&self, choice: Option<u32>) -> Result<()> {
        if let Some(days) = choice {
            if !RETENTION_CHOICES.contains(&days) {
                return Err(DiagError::InvalidRetention(days));
            }
            self.store.set(KEY_RETENTION_DAYS, &days.to_string())?;
        }
        self.store.set(KEY_REMINDER_SHOWN, "true")?;
        tracing::info!(retention_days = self.retention_days(), "retention reminder acknowledged");
        Ok(())
    }

    pub fn retention_days(&self) -> u32 {
        self.store
            .get_i64(KEY_RETENTION_DAYS)
            .and_then(|d| u32::try_from(d).ok())
            .filter(|d| RETENTION_CHOICES.contains(d))
            .unwrap_or(DEFAULT_RETENTION_DAYS)
    }
}
