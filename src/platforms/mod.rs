use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::{
    AddMode, GroupRoster, GuardResult, InboundEvent, JoinRequest, MessageRef, OutgoingText,
    ParticipantAction,
};

pub mod bridge;

#[cfg(test)]
pub mod mock;

/// Trait defining the lifecycle of a connection to the messaging session
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect and start receiving events
    async fn connect(&mut self) -> Result<()>;

    /// Get the platform identifier
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy
    async fn is_connected(&self) -> bool;

    /// Get a receiver for inbound events
    fn get_event_receiver(&self) -> Option<broadcast::Receiver<InboundEvent>>;

    /// Gracefully disconnect
    async fn disconnect(&mut self) -> Result<()>;
}

/// Network actions the engine performs against a chat.
///
/// Every call may fail; callers turn failures into notices.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity of the acting agent
    fn bot_id(&self) -> String;

    async fn send_text(&self, chat_id: &str, message: OutgoingText) -> GuardResult<()>;

    async fn delete_message(&self, message: &MessageRef) -> GuardResult<()>;

    async fn remove_participant(&self, chat_id: &str, participant: &str) -> GuardResult<()>;

    /// Add, remove, promote or demote a member
    async fn update_participant(
        &self,
        chat_id: &str,
        participant: &str,
        action: ParticipantAction,
    ) -> GuardResult<()>;

    async fn block_participant(&self, participant: &str) -> GuardResult<()>;

    async fn get_group_roster(&self, chat_id: &str) -> GuardResult<GroupRoster>;

    async fn update_subject(&self, chat_id: &str, subject: &str) -> GuardResult<()>;

    async fn update_description(&self, chat_id: &str, description: &str) -> GuardResult<()>;

    /// Only admins may send messages while announce mode is on
    async fn set_announce_only(&self, chat_id: &str, enabled: bool) -> GuardResult<()>;

    /// Disappearing-message duration in seconds, 0 disables
    async fn set_ephemeral(&self, chat_id: &str, seconds: u32) -> GuardResult<()>;

    async fn set_member_add_mode(&self, chat_id: &str, mode: AddMode) -> GuardResult<()>;

    async fn invite_code(&self, chat_id: &str) -> GuardResult<String>;

    /// Revoke the current invite link and return the new code
    async fn revoke_invite(&self, chat_id: &str) -> GuardResult<String>;

    async fn leave_group(&self, chat_id: &str) -> GuardResult<()>;

    async fn join_requests(&self, chat_id: &str) -> GuardResult<Vec<JoinRequest>>;

    async fn pin_message(&self, message: &MessageRef, pinned: bool) -> GuardResult<()>;

    /// Use the image carried by `source` as the group picture
    async fn set_group_picture(&self, chat_id: &str, source: &MessageRef) -> GuardResult<()>;

    /// Send a greeting card with the participant's profile picture.
    ///
    /// Transports without media support send the caption as plain text.
    async fn send_profile_card(
        &self,
        chat_id: &str,
        participant: &str,
        caption: &str,
        mentions: Vec<String>,
    ) -> GuardResult<()> {
        let _ = participant;
        self.send_text(chat_id, OutgoingText::new(caption).mentioning(mentions))
            .await
    }
}
