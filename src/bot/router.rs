// src/bot/router.rs - Permission-gated dispatch of recognized commands

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::bot::commands::RecognizedCommand;
use crate::bot::group_commands::{CommandContext, GroupCommandHandlers};
use crate::bot::notices;
use crate::bot::permissions::PermissionResolver;
use crate::platforms::Transport;
use crate::store::SharedStore;
use crate::types::{ChatRecord, GuardError, GuardResult, InboundMessage, OutgoingText};

/// How a recognized command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Dispatched,
    /// Sent from a direct chat
    GroupOnly,
    /// The roster could not be fetched
    RosterUnavailable,
    /// The bot lacks admin rights for this command
    BotNotAdmin,
    /// The sender holds none of the authority sources
    NotAuthorized,
}

pub struct CommandRouter {
    resolver: Arc<PermissionResolver>,
    handlers: GroupCommandHandlers,
    store: SharedStore,
    transport: Arc<dyn Transport>,
}

impl CommandRouter {
    pub fn new(resolver: Arc<PermissionResolver>, store: SharedStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            handlers: GroupCommandHandlers::new(store.clone(), Arc::clone(&transport)),
            store,
            transport,
        }
    }

    pub async fn route(
        &self,
        msg: &InboundMessage,
        command: &RecognizedCommand,
        now: DateTime<Utc>,
    ) -> GuardResult<RouteOutcome> {
        let chat_id = msg.chat_id.as_str();

        if !msg.is_group() {
            self.notify(chat_id, notices::group_only(&command.prefix)).await;
            return Ok(RouteOutcome::GroupOnly);
        }

        let roster = match self.transport.get_group_roster(chat_id).await {
            Ok(roster) => roster,
            Err(e) => {
                warn!("Roster for {} unavailable, dropping {}: {}", chat_id, command.invocation(), e);
                self.notify(chat_id, "Failed to retrieve group information. Make sure the bot is in this group.")
                    .await;
                return Ok(RouteOutcome::RosterUnavailable);
            }
        };

        let subject = roster.subject.clone();
        let (group_name, settings) = self
            .store
            .transaction(|db| {
                let group = db
                    .entry(msg.chat_id.clone())
                    .or_insert_with(|| ChatRecord::new_group(subject.as_deref(), now));
                (group.display_name.clone(), group.group_settings_mut().clone())
            })
            .await?;

        let bot_id = self.transport.bot_id();
        let sender = msg.effective_sender(&bot_id);
        let permissions = self.resolver.resolve(&sender, &bot_id, Some(&roster));

        match self.resolver.authorize(command.spec, &permissions, chat_id, &sender) {
            Ok(()) => {}
            Err(GuardError::Capability { .. }) => {
                self.notify(chat_id, notices::bot_not_admin(&command.invocation())).await;
                return Ok(RouteOutcome::BotNotAdmin);
            }
            Err(GuardError::PermissionDenied { .. }) => {
                self.notify(chat_id, notices::sender_not_authorized(&command.invocation())).await;
                return Ok(RouteOutcome::NotAuthorized);
            }
            Err(e) => return Err(e),
        }

        info!("{} runs {} in {}", sender, command.invocation(), chat_id);
        let ctx = CommandContext {
            msg,
            command,
            roster: &roster,
            group_name: roster.subject.clone().unwrap_or(group_name),
            settings,
            now,
        };
        self.handlers.dispatch(&ctx).await?;
        debug!("{} finished in {}", command.spec.name, chat_id);
        Ok(RouteOutcome::Dispatched)
    }

    async fn notify(&self, chat_id: &str, text: impl Into<String>) {
        if let Err(e) = self.transport.send_text(chat_id, OutgoingText::new(text)).await {
            warn!("Failed to send command notice to {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::commands::CommandRecognizer;
    use crate::config::CommandSettings;
    use crate::platforms::mock::{Call, RecordingTransport};
    use crate::store::MemoryStore;
    use crate::types::{MessagePayload, ParticipantAction};

    const GROUP: &str = "120363000000@g.us";
    const OWNER: &str = "6281111111111@s.whatsapp.net";
    const MEMBER: &str = "6283333333333@s.whatsapp.net";
    const CONFIGURED: &str = "6287777777777@s.whatsapp.net";

    fn router(bot_admin: bool) -> (CommandRouter, Arc<RecordingTransport>, SharedStore) {
        let store = SharedStore::new(Arc::new(MemoryStore::new()));
        let transport = Arc::new(RecordingTransport::new(bot_admin));
        let resolver = Arc::new(PermissionResolver::new(&["6287777777777".to_string()]));
        (
            CommandRouter::new(resolver, store.clone(), transport.clone()),
            transport,
            store,
        )
    }

    async fn send(router: &CommandRouter, chat_id: &str, sender: &str, text: &str) -> RouteOutcome {
        let recognizer = CommandRecognizer::new(&CommandSettings {
            prefix_enabled: true,
            prefixes: vec!["!".to_string()],
        });
        let msg = InboundMessage {
            chat_id: chat_id.to_string(),
            sender: sender.to_string(),
            from_me: false,
            message_id: "m1".to_string(),
            push_name: None,
            payload: MessagePayload::text(text),
            context: Default::default(),
        };
        let command = recognizer.recognize(text).unwrap();
        router.route(&msg, &command, Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_direct_chat_is_rejected() {
        let (router, transport, _) = router(true);
        assert_eq!(send(&router, MEMBER, MEMBER, "!tagall").await, RouteOutcome::GroupOnly);
        assert!(transport.last_text().unwrap().contains("only for groups"));
    }

    #[tokio::test]
    async fn test_capability_checked_before_authorization() {
        let (router, transport, _) = router(false);
        assert_eq!(send(&router, GROUP, MEMBER, "!kick 628").await, RouteOutcome::BotNotAdmin);
        assert_eq!(
            transport.last_text().unwrap(),
            "Bot must be a group admin to use the `!kick` command."
        );
    }

    #[tokio::test]
    async fn test_member_is_not_authorized() {
        let (router, transport, _) = router(true);
        assert_eq!(send(&router, GROUP, MEMBER, "!tagall").await, RouteOutcome::NotAuthorized);
        assert!(transport.last_text().unwrap().starts_with("You must be a group admin or owner"));
        assert!(!transport.calls().iter().any(|c| matches!(c, Call::SendText { message, .. } if message.mentions.len() > 1)));
    }

    #[tokio::test]
    async fn test_owner_and_configured_owner_dispatch() {
        let (router, transport, _) = router(true);
        assert_eq!(send(&router, GROUP, OWNER, "!promote 6283333333333").await, RouteOutcome::Dispatched);
        assert!(transport.calls().contains(&Call::UpdateParticipant {
            chat_id: GROUP.to_string(),
            participant: MEMBER.to_string(),
            action: ParticipantAction::Promote,
        }));

        assert_eq!(send(&router, GROUP, CONFIGURED, "!anti_nsfw on").await, RouteOutcome::Dispatched);
    }

    #[tokio::test]
    async fn test_menu_alias_is_open_and_creates_group_record() {
        let (router, transport, store) = router(false);
        assert_eq!(send(&router, GROUP, MEMBER, "!menu").await, RouteOutcome::Dispatched);
        assert!(transport.last_text().unwrap().contains("Group: Test Group"));
        assert_eq!(store.snapshot().await.unwrap()[GROUP].display_name, "Test Group");
    }

    #[tokio::test]
    async fn test_roster_failure_drops_command() {
        let (router, transport, _) = router(true);
        transport.fail("get_group_roster");
        assert_eq!(send(&router, GROUP, OWNER, "!tagall").await, RouteOutcome::RosterUnavailable);
        assert!(transport.last_text().unwrap().starts_with("Failed to retrieve group information"));
    }
}
