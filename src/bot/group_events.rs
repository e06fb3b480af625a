// src/bot/group_events.rs - Welcome/goodbye greetings and group subject changes

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::platforms::Transport;
use crate::store::SharedStore;
use crate::types::{
    mention_tag, same_user, ChatRecord, GroupUpdate, GuardResult, OutgoingText,
    ParticipantAction, ParticipantsUpdate,
};

/// Substitute `{name}` with the member's mention and `{group}` with the group name
pub fn render_greeting(template: &str, participant: &str, group_name: &str) -> String {
    template
        .replace("{name}", &mention_tag(participant))
        .replace("{group}", group_name)
}

/// A greeting ready to be sent for one member
#[derive(Debug, Clone, PartialEq)]
struct Greeting {
    participant: String,
    text: String,
    with_picture: bool,
}

pub struct GroupEventHandler {
    store: SharedStore,
    transport: Arc<dyn Transport>,
}

impl GroupEventHandler {
    pub fn new(store: SharedStore, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Greet members who joined or left; the bot itself is never greeted
    pub async fn handle_participants(
        &self,
        update: &ParticipantsUpdate,
        now: DateTime<Utc>,
    ) -> GuardResult<()> {
        let bot_id = self.transport.bot_id();

        let greetings = self
            .store
            .transaction(|db| {
                let group = db
                    .entry(update.chat_id.clone())
                    .or_insert_with(|| ChatRecord::new_group(None, now));
                let group_name = group.display_name.clone();
                let settings = group.group_settings_mut();

                let (template, with_picture) = match update.action {
                    ParticipantAction::Add => (settings.welcome_message.clone(), settings.welcome_with_pp),
                    ParticipantAction::Remove => (settings.goodbye_message.clone(), false),
                    _ => (None, false),
                };
                let Some(template) = template else {
                    return Vec::new();
                };

                update
                    .participants
                    .iter()
                    .filter(|p| !same_user(p, &bot_id))
                    .map(|p| Greeting {
                        participant: p.clone(),
                        text: render_greeting(&template, p, &group_name),
                        with_picture,
                    })
                    .collect::<Vec<_>>()
            })
            .await?;

        if greetings.is_empty() {
            debug!("No greeting for {:?} in {}", update.action, update.chat_id);
        }
        for greeting in greetings {
            self.send_greeting(&update.chat_id, greeting).await;
        }
        Ok(())
    }

    async fn send_greeting(&self, chat_id: &str, greeting: Greeting) {
        let mentions = vec![greeting.participant.clone()];
        if greeting.with_picture {
            match self
                .transport
                .send_profile_card(chat_id, &greeting.participant, &greeting.text, mentions.clone())
                .await
            {
                Ok(()) => return,
                Err(e) => warn!(
                    "Profile card for {} failed, sending text only: {}",
                    greeting.participant, e
                ),
            }
        }

        let message = OutgoingText::new(greeting.text).mentioning(mentions);
        if let Err(e) = self.transport.send_text(chat_id, message).await {
            warn!("Failed to greet {} in {}: {}", greeting.participant, chat_id, e);
        }
    }

    /// Track subject changes and announce them in the group
    pub async fn handle_group_update(&self, update: &GroupUpdate, now: DateTime<Utc>) -> GuardResult<()> {
        let Some(subject) = update.subject.as_deref() else {
            return Ok(());
        };

        let previous = self
            .store
            .transaction(|db| {
                let group = db
                    .entry(update.chat_id.clone())
                    .or_insert_with(|| ChatRecord::new_group(None, now));
                if group.display_name == subject {
                    return None;
                }
                let previous = std::mem::replace(&mut group.display_name, subject.to_string());
                Some(previous)
            })
            .await?;

        let Some(previous) = previous else {
            debug!("Group {} updated without a subject change", update.chat_id);
            return Ok(());
        };

        info!("Group {} renamed from {:?} to {:?}", update.chat_id, previous, subject);
        let notice = format!(
            "✨ Detected changes in group *{}*:\n- Group name changed from \"{}\" to \"{}\"",
            subject, previous, subject
        );
        if let Err(e) = self.transport.send_text(&update.chat_id, OutgoingText::new(notice)).await {
            warn!("Failed to announce rename of {}: {}", update.chat_id, e);
        }
        Ok(())
    }
}
