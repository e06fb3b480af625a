use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::BotConfiguration;
use crate::platforms::Transport;
use crate::store::SharedStore;
use crate::types::{GuardResult, InboundEvent, InboundMessage, ViolationEvent};

pub mod classifiers;
pub mod commands;
pub mod extract;
pub mod flood;
pub mod group_commands;
pub mod group_events;
pub mod moderation;
pub mod notices;
pub mod permissions;
pub mod router;
pub mod warnings;

use commands::CommandRecognizer;
use group_events::GroupEventHandler;
use moderation::{ModerationPipeline, Verdict};
use permissions::PermissionResolver;
use router::{CommandRouter, RouteOutcome};
use warnings::LadderOutcome;

/// What the engine did with one inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Ordinary message, nothing to do beyond bookkeeping
    Passed,
    /// The message tripped a policy and was not routed further
    Moderated {
        event: ViolationEvent,
        outcome: Option<LadderOutcome>,
    },
    Command(RouteOutcome),
    GroupEvent,
}

/// Core engine: moderation first, then command routing, plus group lifecycle events
pub struct GuardBot {
    recognizer: Arc<CommandRecognizer>,
    pipeline: ModerationPipeline,
    router: CommandRouter,
    group_events: GroupEventHandler,
}

impl GuardBot {
    pub fn new(
        config: &BotConfiguration,
        transport: Arc<dyn Transport>,
        store: SharedStore,
    ) -> GuardResult<Self> {
        let recognizer = Arc::new(CommandRecognizer::new(&config.commands));
        let resolver = Arc::new(PermissionResolver::new(&config.owners));

        let pipeline = ModerationPipeline::new(
            &config.moderation,
            Arc::clone(&recognizer),
            Arc::clone(&resolver),
            store.clone(),
            Arc::clone(&transport),
        )?;

        Ok(Self {
            recognizer,
            pipeline,
            router: CommandRouter::new(resolver, store.clone(), Arc::clone(&transport)),
            group_events: GroupEventHandler::new(store, transport),
        })
    }

    /// Process events one at a time until the sender side closes
    pub async fn run(&self, mut events: broadcast::Receiver<InboundEvent>) {
        info!("Guard bot is processing events");
        loop {
            match events.recv().await {
                Ok(event) => self.handle_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event processing fell behind, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event stream closed");
                    break;
                }
            }
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) {
        self.handle_event_at(event, Utc::now()).await
    }

    /// Failures are logged; no event can stop the engine
    pub async fn handle_event_at(&self, event: InboundEvent, now: DateTime<Utc>) {
        if let Err(e) = self.process_event(&event, now).await {
            error!("Failed to process event: {}", e);
        }
    }

    pub async fn process_event(&self, event: &InboundEvent, now: DateTime<Utc>) -> GuardResult<EventOutcome> {
        match event {
            InboundEvent::Message(msg) => self.process_message(msg, now).await,
            InboundEvent::Participants(update) => {
                self.group_events.handle_participants(update, now).await?;
                Ok(EventOutcome::GroupEvent)
            }
            InboundEvent::Group(update) => {
                self.group_events.handle_group_update(update, now).await?;
                Ok(EventOutcome::GroupEvent)
            }
        }
    }

    async fn process_message(&self, msg: &InboundMessage, now: DateTime<Utc>) -> GuardResult<EventOutcome> {
        let text = extract::extract_text(&msg.payload);
        debug!("Message {} in {} ({} chars)", msg.message_id, msg.chat_id, text.chars().count());

        if let Verdict::Violation { event, outcome } = self.pipeline.process(msg, &text, now).await? {
            return Ok(EventOutcome::Moderated { event, outcome });
        }

        match self.recognizer.recognize(&text) {
            Some(command) => Ok(EventOutcome::Command(self.router.route(msg, &command, now).await?)),
            None => Ok(EventOutcome::Passed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{Call, RecordingTransport, BOT_ID};
    use crate::store::{ChatStore, JsonFileStore, MemoryStore};
    use crate::types::{
        ChatDatabase, ChatRecord, GroupSettings, MessagePayload, ViolationKind, WarningStamp,
    };
    use chrono::Duration;
    use tempfile::TempDir;

    const GROUP: &str = "120363000000@g.us";
    const OWNER: &str = "6281111111111@s.whatsapp.net";
    const MEMBER: &str = "6283333333333@s.whatsapp.net";

    struct Harness {
        bot: GuardBot,
        transport: Arc<RecordingTransport>,
        store: SharedStore,
    }

    fn config() -> BotConfiguration {
        let mut config = BotConfiguration::default();
        config.commands.prefixes = vec!["!".to_string()];
        config
    }

    fn harness_with(bot_admin: bool, settings: GroupSettings, store: Arc<dyn ChatStore>) -> Harness {
        let mut db = store.load().unwrap();
        let mut group = ChatRecord::new_group(Some("Test Group"), Utc::now());
        group.group_settings = Some(settings);
        db.insert(GROUP.to_string(), group);
        store.save(&db).unwrap();

        let store = SharedStore::new(store);
        let transport = Arc::new(RecordingTransport::new(bot_admin));
        let bot = GuardBot::new(&config(), transport.clone(), store.clone()).unwrap();
        Harness { bot, transport, store }
    }

    fn harness(bot_admin: bool, settings: GroupSettings) -> Harness {
        harness_with(bot_admin, settings, Arc::new(MemoryStore::new()))
    }

    fn with_policies(kinds: &[ViolationKind]) -> GroupSettings {
        let mut settings = GroupSettings::default();
        for kind in kinds {
            settings.set_policy(*kind, true);
        }
        settings
    }

    fn text_from(sender: &str, id: &str, text: &str) -> InboundEvent {
        InboundEvent::Message(InboundMessage {
            chat_id: GROUP.to_string(),
            sender: sender.to_string(),
            from_me: false,
            message_id: id.to_string(),
            push_name: Some("Tester".to_string()),
            payload: MessagePayload::text(text),
            context: Default::default(),
        })
    }

    async fn warnings(store: &SharedStore, who: &str) -> Vec<WarningStamp> {
        let db: ChatDatabase = store.snapshot().await.unwrap();
        db[GROUP].group_settings.as_ref().unwrap().warnings.get(who).cloned().unwrap_or_default()
    }

    #[test_log::test(tokio::test)]
    async fn test_toxic_message_gets_first_warning() {
        let h = harness(true, with_policies(&[ViolationKind::Toxic]));
        let now = Utc::now();
        let outcome = h.bot.process_event(&text_from(MEMBER, "m1", "dasar anjing kau"), now).await.unwrap();

        assert!(matches!(
            outcome,
            EventOutcome::Moderated { outcome: Some(LadderOutcome::Warned { count: 1, limit: 5 }), .. }
        ));
        assert!(h.transport.calls().contains(&Call::Delete { message_id: "m1".to_string() }));
        assert_eq!(warnings(&h.store, MEMBER).await, vec![WarningStamp(now)]);
        let notice = h.transport.last_text().unwrap();
        assert!(notice.contains("1/5"));
        assert!(notice.contains("Toxic language"));
    }

    #[test_log::test(tokio::test)]
    async fn test_fifth_warning_removes_offender() {
        let now = Utc::now();
        let mut settings = with_policies(&[ViolationKind::Toxic]);
        settings.warnings.insert(
            MEMBER.to_string(),
            [25, 15, 8, 2].iter().map(|m| WarningStamp(now - Duration::minutes(*m))).collect(),
        );
        let h = harness(true, settings);
        h.bot.process_event(&text_from(MEMBER, "m1", "goblok"), now).await.unwrap();

        assert!(h.transport.calls().contains(&Call::Remove {
            chat_id: GROUP.to_string(),
            participant: MEMBER.to_string(),
        }));
        assert!(warnings(&h.store, MEMBER).await.is_empty());
        assert!(h.transport.last_text().unwrap().contains("has been removed"));
    }

    #[test_log::test(tokio::test)]
    async fn test_virtex_removes_and_blocks_immediately() {
        let now = Utc::now();
        let mut settings = with_policies(&[ViolationKind::Virtex]);
        settings.warnings.insert(MEMBER.to_string(), vec![WarningStamp(now - Duration::minutes(1))]);
        let h = harness(true, settings);
        let payload = "x".repeat(50);
        let outcome = h.bot.process_event(&text_from(MEMBER, "m1", &payload), now).await.unwrap();

        assert!(matches!(
            outcome,
            EventOutcome::Moderated { outcome: Some(LadderOutcome::Immediate { cleared: 1 }), .. }
        ));
        let calls = h.transport.calls();
        assert!(calls.contains(&Call::Remove { chat_id: GROUP.to_string(), participant: MEMBER.to_string() }));
        assert!(calls.contains(&Call::Block { participant: MEMBER.to_string() }));
        assert!(warnings(&h.store, MEMBER).await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_link_without_bot_admin_is_notice_only() {
        let h = harness(false, with_policies(&[ViolationKind::Link]));
        let outcome = h
            .bot
            .process_event(&text_from(MEMBER, "m1", "see https://example.com"), Utc::now())
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Moderated { outcome: None, .. }));
        let calls = h.transport.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::SendText { message, .. } => {
                assert!(message.text.contains("no action was taken"));
                assert_eq!(message.quoted.as_ref().map(|q| q.id.as_str()), Some("m1"));
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert!(warnings(&h.store, MEMBER).await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_kick_command_is_routed_not_moderated() {
        let h = harness(true, with_policies(&ViolationKind::ALL));
        let outcome = h
            .bot
            .process_event(&text_from(OWNER, "m1", "!kick 6281234567890"), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Command(RouteOutcome::Dispatched));
        let calls = h.transport.calls();
        assert!(calls.contains(&Call::Remove {
            chat_id: GROUP.to_string(),
            participant: "6281234567890@s.whatsapp.net".to_string(),
        }));
        assert!(!calls.iter().any(|c| matches!(c, Call::Delete { .. })));
    }

    #[test_log::test(tokio::test)]
    async fn test_member_command_text_is_not_classified() {
        let h = harness(true, with_policies(&[ViolationKind::Link]));
        let outcome = h
            .bot
            .process_event(&text_from(MEMBER, "m1", "!hidetag https://example.com"), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Command(RouteOutcome::NotAuthorized));
        assert!(warnings(&h.store, MEMBER).await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_flood_is_detected_on_sixth_message() {
        let h = harness(true, with_policies(&[ViolationKind::Flood]));
        let start = Utc::now();
        for i in 0..5 {
            let at = start + Duration::seconds(i);
            let outcome = h.bot.process_event(&text_from(MEMBER, &format!("m{}", i), "hai"), at).await.unwrap();
            assert_eq!(outcome, EventOutcome::Passed);
        }
        let outcome = h
            .bot
            .process_event(&text_from(MEMBER, "m5", "hai"), start + Duration::seconds(5))
            .await
            .unwrap();
        match outcome {
            EventOutcome::Moderated { event, .. } => assert_eq!(event.kind, ViolationKind::Flood),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_own_messages_are_exempt() {
        let h = harness(true, with_policies(&[ViolationKind::Toxic]));
        let event = InboundEvent::Message(InboundMessage {
            chat_id: GROUP.to_string(),
            sender: "someone-else@s.whatsapp.net".to_string(),
            from_me: true,
            message_id: "m1".to_string(),
            push_name: None,
            payload: MessagePayload::text("anjing"),
            context: Default::default(),
        });
        assert_eq!(h.bot.process_event(&event, Utc::now()).await.unwrap(), EventOutcome::Passed);
        assert!(h.transport.calls().is_empty());
        let db = h.store.snapshot().await.unwrap();
        assert_eq!(db[BOT_ID].message_count, 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_state_survives_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db").join("chats.json");
        let h = harness_with(
            true,
            with_policies(&[ViolationKind::Promotion]),
            Arc::new(JsonFileStore::new(&path)),
        );
        h.bot
            .handle_event(text_from(MEMBER, "m1", "gabung wa.me/6281234"))
            .await;

        let reopened = JsonFileStore::new(&path).load().unwrap();
        let settings = reopened[GROUP].group_settings.as_ref().unwrap();
        assert_eq!(settings.warnings[MEMBER].len(), 1);
        assert_eq!(reopened[MEMBER].display_name, "Tester");
    }

    #[test_log::test(tokio::test)]
    async fn test_run_drains_broadcast_stream() {
        let h = harness(true, GroupSettings::default());
        let (sender, receiver) = broadcast::channel(16);
        sender.send(text_from(MEMBER, "m1", "halo")).unwrap();
        sender.send(text_from(MEMBER, "m2", "halo lagi")).unwrap();
        drop(sender);

        h.bot.run(receiver).await;
        let db = h.store.snapshot().await.unwrap();
        assert_eq!(db[MEMBER].message_count, 2);
    }
}
