// src/bot/warnings.rs - Time-decayed warning ladder per (group, offender)

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::config::ModerationSettings;
use crate::types::{GroupSettings, WarningStamp};

/// What a confirmed violation did to the offender's ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderOutcome {
    /// Still below the limit; `count` includes this violation
    Warned { count: usize, limit: usize },
    /// Limit reached; the history has already been cleared
    Escalated { limit: usize },
    /// Immediate punishment; `cleared` prior warnings were discarded
    Immediate { cleared: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct WarningLadder {
    window: Duration,
    limit: usize,
}

impl WarningLadder {
    pub fn new(settings: &ModerationSettings) -> Self {
        Self {
            window: Duration::minutes(settings.warning_window_minutes as i64),
            limit: settings.warning_limit,
        }
    }

    /// Drop stamps older than the window. Idempotent.
    pub fn prune(&self, stamps: &mut Vec<WarningStamp>, now: DateTime<Utc>) {
        let window = self.window;
        stamps.retain(|WarningStamp(at)| now - *at < window);
    }

    /// Apply one ladder violation. Reaching the limit clears the history
    /// before any removal is attempted, so a failed removal does not re-arm it.
    pub fn record_warning(
        &self,
        settings: &mut GroupSettings,
        offender: &str,
        now: DateTime<Utc>,
    ) -> LadderOutcome {
        let stamps = settings.warnings.entry(offender.to_string()).or_default();
        self.prune(stamps, now);
        stamps.push(WarningStamp(now));
        let count = stamps.len();

        if count >= self.limit {
            stamps.clear();
            debug!("{} reached {} warnings, escalating", offender, self.limit);
            LadderOutcome::Escalated { limit: self.limit }
        } else {
            LadderOutcome::Warned { count, limit: self.limit }
        }
    }

    /// Bypass the ladder: the whole history is discarded whatever its size
    pub fn record_immediate(&self, settings: &mut GroupSettings, offender: &str) -> LadderOutcome {
        let stamps = settings.warnings.entry(offender.to_string()).or_default();
        let cleared = stamps.len();
        stamps.clear();
        LadderOutcome::Immediate { cleared }
    }
}
