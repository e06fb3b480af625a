// src/bot/flood.rs - Per-group message rate windows for flood detection

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;

use crate::config::ModerationSettings;

type SenderWindows = HashMap<String, Vec<(DateTime<Utc>, String)>>;

/// In-memory only; starts empty on every restart
#[derive(Debug)]
pub struct FloodTracker {
    window: Duration,
    threshold: usize,
    cleanup_interval: Duration,
    groups: HashMap<String, SenderWindows>,
    last_cleanup: Option<DateTime<Utc>>,
}

impl FloodTracker {
    pub fn new(settings: &ModerationSettings) -> Self {
        Self {
            window: Duration::seconds(settings.flood_window_seconds as i64),
            threshold: settings.flood_threshold,
            cleanup_interval: Duration::seconds(settings.flood_cleanup_seconds as i64),
            groups: HashMap::new(),
            last_cleanup: None,
        }
    }

    /// Record one message and report whether the sender is flooding
    pub fn record(&mut self, group: &str, sender: &str, message_id: &str, now: DateTime<Utc>) -> bool {
        let window = self.window;
        let entries = self
            .groups
            .entry(group.to_string())
            .or_default()
            .entry(sender.to_string())
            .or_default();
        entries.retain(|(at, _)| now - *at < window);
        entries.push((now, message_id.to_string()));
        let count = entries.len();

        let cleanup_due = self
            .last_cleanup
            .map_or(true, |last| now - last > self.cleanup_interval);
        if cleanup_due {
            self.cleanup(now);
        }

        count > self.threshold
    }

    /// Drop stale senders, then groups left without any
    fn cleanup(&mut self, now: DateTime<Utc>) {
        let horizon = self.window * 2;
        self.groups.retain(|_, senders| {
            senders.retain(|_, entries| {
                entries.retain(|(at, _)| now - *at < horizon);
                !entries.is_empty()
            });
            !senders.is_empty()
        });
        self.last_cleanup = Some(now);
        debug!("Flood windows cleaned, {} groups tracked", self.groups.len());
    }

    #[cfg(test)]
    fn tracked_senders(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |senders| senders.len())
    }
}
