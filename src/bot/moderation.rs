// src/bot/moderation.rs - Per-message moderation: exemption, classification, ladder, enforcement

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bot::classifiers::ContentClassifiers;
use crate::bot::commands::CommandRecognizer;
use crate::bot::flood::FloodTracker;
use crate::bot::notices;
use crate::bot::permissions::PermissionResolver;
use crate::bot::warnings::{LadderOutcome, WarningLadder};
use crate::config::ModerationSettings;
use crate::platforms::Transport;
use crate::store::SharedStore;
use crate::types::{
    ChatDatabase, ChatRecord, GroupRoster, GroupSettings, GuardResult, InboundMessage,
    OutgoingText, PermissionContext, Severity, ViolationEvent, ViolationKind, ANONYMOUS,
};

/// Result of running one message through moderation
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No violation; the message may continue to command routing
    Proceed,
    /// A violation was handled and processing stops here.
    /// `outcome` is `None` when the bot could not act.
    Violation {
        event: ViolationEvent,
        outcome: Option<LadderOutcome>,
    },
}

/// Create the sender's record and the group record if missing, and count the message
pub(crate) fn record_activity(
    db: &mut ChatDatabase,
    msg: &InboundMessage,
    sender: &str,
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> Option<GroupSettings> {
    db.entry(sender.to_string())
        .or_insert_with(|| ChatRecord::new(msg.push_name.as_deref().unwrap_or(ANONYMOUS), now))
        .touch(now);

    if !msg.is_group() {
        return None;
    }
    let group = db
        .entry(msg.chat_id.clone())
        .or_insert_with(|| ChatRecord::new_group(subject, now));
    Some(group.group_settings_mut().clone())
}

pub struct ModerationPipeline {
    classifiers: ContentClassifiers,
    ladder: WarningLadder,
    flood: Mutex<FloodTracker>,
    recognizer: Arc<CommandRecognizer>,
    resolver: Arc<PermissionResolver>,
    store: SharedStore,
    transport: Arc<dyn Transport>,
}

impl ModerationPipeline {
    pub fn new(
        settings: &ModerationSettings,
        recognizer: Arc<CommandRecognizer>,
        resolver: Arc<PermissionResolver>,
        store: SharedStore,
        transport: Arc<dyn Transport>,
    ) -> GuardResult<Self> {
        Ok(Self {
            classifiers: ContentClassifiers::new(settings)?,
            ladder: WarningLadder::new(settings),
            flood: Mutex::new(FloodTracker::new(settings)),
            recognizer,
            resolver,
            store,
            transport,
        })
    }

    /// Moderate one message whose text has already been extracted
    pub async fn process(
        &self,
        msg: &InboundMessage,
        text: &str,
        now: DateTime<Utc>,
    ) -> GuardResult<Verdict> {
        let bot_id = self.transport.bot_id();
        let sender = msg.effective_sender(&bot_id);

        // Roster is fetched per message so exemption never reads stale roles
        let roster = if msg.is_group() {
            match self.transport.get_group_roster(&msg.chat_id).await {
                Ok(roster) => Some(roster),
                Err(e) => {
                    warn!("Could not fetch roster for {}: {}", msg.chat_id, e);
                    None
                }
            }
        } else {
            None
        };
        let subject = roster.as_ref().and_then(|r| r.subject.clone());

        // Warning history is only touched once a violation is confirmed
        let settings = self
            .store
            .transaction(|db| record_activity(db, msg, &sender, subject.as_deref(), now))
            .await?;

        let Some(settings) = settings else {
            return Ok(Verdict::Proceed);
        };

        let ctx = self.resolver.resolve(&sender, &bot_id, roster.as_ref());
        if ctx.sender_is_exempt() {
            debug!("{} is exempt from moderation in {}", sender, msg.chat_id);
            return Ok(Verdict::Proceed);
        }

        if self.recognizer.is_command(text) {
            debug!("Skipping policy checks for command text from {}", sender);
            return Ok(Verdict::Proceed);
        }

        let Some((kind, severity)) = self.classify(msg, &sender, text, &settings, now).await else {
            return Ok(Verdict::Proceed);
        };

        let event = ViolationEvent {
            offender: sender,
            group: msg.chat_id.clone(),
            kind,
            timestamp: now,
            severity,
        };
        let outcome = self.enforce(msg, &event, &ctx, roster.as_ref()).await;
        Ok(Verdict::Violation { event, outcome })
    }

    /// Flood first, then content rules in table order
    async fn classify(
        &self,
        msg: &InboundMessage,
        sender: &str,
        text: &str,
        settings: &GroupSettings,
        now: DateTime<Utc>,
    ) -> Option<(ViolationKind, Severity)> {
        if settings.policy_enabled(ViolationKind::Flood) {
            let flooding = self
                .flood
                .lock()
                .await
                .record(&msg.chat_id, sender, &msg.message_id, now);
            if flooding {
                return Some((ViolationKind::Flood, ViolationKind::Flood.severity()));
            }
        }

        self.classifiers
            .classify(text, settings)
            .map(|rule| (rule.kind, rule.severity))
    }

    /// Persist the ladder decision, then act on it
    async fn enforce(
        &self,
        msg: &InboundMessage,
        event: &ViolationEvent,
        ctx: &PermissionContext,
        roster: Option<&GroupRoster>,
    ) -> Option<LadderOutcome> {
        let offender = event.offender.as_str();
        let kind = event.kind;

        if !ctx.bot_is_admin {
            info!(
                "{} by {} in {}, bot is not an admin so no action taken",
                kind, offender, event.group
            );
            let notice = OutgoingText::new(notices::no_capability(kind, offender))
                .mentioning(vec![offender.to_string()])
                .quoting(msg.message_ref());
            self.notify(&event.group, notice).await;
            return None;
        }

        let outcome = self.apply_ladder(event, roster).await;
        info!("{} by {} in {}: {:?}", kind, offender, event.group, outcome);

        if let Err(e) = self.transport.delete_message(&msg.message_ref()).await {
            warn!("Failed to delete message {} in {}: {}", msg.message_id, event.group, e);
        }

        let text = match outcome {
            LadderOutcome::Warned { count, limit } => notices::warned(kind, offender, count, limit),
            LadderOutcome::Escalated { limit } => {
                match self.transport.remove_participant(&event.group, offender).await {
                    Ok(()) => notices::escalated(kind, offender, limit),
                    Err(e) => {
                        warn!("Failed to remove {} from {}: {}", offender, event.group, e);
                        notices::escalation_failed(kind, offender, limit)
                    }
                }
            }
            LadderOutcome::Immediate { .. } => {
                let removed = self.transport.remove_participant(&event.group, offender).await;
                let blocked = match removed {
                    Ok(()) => self.transport.block_participant(offender).await,
                    Err(e) => Err(e),
                };
                match blocked {
                    Ok(()) => notices::immediate(kind, offender),
                    Err(e) => {
                        warn!("Immediate action against {} in {} failed: {}", offender, event.group, e);
                        notices::immediate_failed(kind, offender)
                    }
                }
            }
        };

        let notice = OutgoingText::new(text).mentioning(vec![offender.to_string()]);
        self.notify(&event.group, notice).await;
        Some(outcome)
    }

    /// Record the violation. A failed load still yields a decision, computed
    /// from a fresh history; that update is lost.
    async fn apply_ladder(&self, event: &ViolationEvent, roster: Option<&GroupRoster>) -> LadderOutcome {
        let ladder = self.ladder;
        let apply = |settings: &mut GroupSettings| match event.severity {
            Severity::Warn => ladder.record_warning(settings, &event.offender, event.timestamp),
            Severity::Immediate => ladder.record_immediate(settings, &event.offender),
        };
        let subject = roster.and_then(|r| r.subject.as_deref());

        let result = self
            .store
            .transaction(|db| {
                let group = db
                    .entry(event.group.clone())
                    .or_insert_with(|| ChatRecord::new_group(subject, event.timestamp));
                apply(group.group_settings_mut())
            })
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Warning history for {} not persisted: {}", event.group, e);
                apply(&mut GroupSettings::default())
            }
        }
    }

    async fn notify(&self, chat_id: &str, notice: OutgoingText) {
        if let Err(e) = self.transport.send_text(chat_id, notice).await {
            warn!("Failed to send moderation notice to {}: {}", chat_id, e);
        }
    }
}
