// src/platforms/mock.rs - Recording transport for tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::platforms::Transport;
use crate::types::{
    AddMode, GroupRoster, GuardError, GuardResult, JoinRequest, MessageRef, OutgoingText,
    Participant, ParticipantAction, ParticipantRole,
};

pub const BOT_ID: &str = "6280000000000@s.whatsapp.net";

/// One outbound call, as observed by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SendText { chat_id: String, message: OutgoingText },
    Delete { message_id: String },
    Remove { chat_id: String, participant: String },
    UpdateParticipant { chat_id: String, participant: String, action: ParticipantAction },
    Block { participant: String },
    UpdateSubject { chat_id: String, subject: String },
    UpdateDescription { chat_id: String, description: String },
    AnnounceOnly { chat_id: String, enabled: bool },
    Ephemeral { chat_id: String, seconds: u32 },
    AddMode { chat_id: String, mode: AddMode },
    InviteCode { chat_id: String },
    RevokeInvite { chat_id: String },
    Leave { chat_id: String },
    JoinRequests { chat_id: String },
    Pin { message_id: String, pinned: bool },
    GroupPicture { chat_id: String },
    ProfileCard { chat_id: String, participant: String, caption: String },
}

pub struct RecordingTransport {
    roster: Mutex<GroupRoster>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    join_requests: Vec<JoinRequest>,
}

impl RecordingTransport {
    /// Roster with the bot, one admin and one member; `bot_admin` sets the bot's role
    pub fn new(bot_admin: bool) -> Self {
        let bot_role = if bot_admin { ParticipantRole::Admin } else { ParticipantRole::Member };
        Self::with_roster(GroupRoster {
            subject: Some("Test Group".to_string()),
            owner: Some("6281111111111@s.whatsapp.net".to_string()),
            participants: vec![
                Participant { id: BOT_ID.to_string(), role: bot_role },
                Participant {
                    id: "6281111111111@s.whatsapp.net".to_string(),
                    role: ParticipantRole::Superadmin,
                },
                Participant {
                    id: "6282222222222@s.whatsapp.net".to_string(),
                    role: ParticipantRole::Admin,
                },
                Participant {
                    id: "6283333333333@s.whatsapp.net".to_string(),
                    role: ParticipantRole::Member,
                },
            ],
            ephemeral_duration: 0,
        })
    }

    pub fn with_roster(roster: GroupRoster) -> Self {
        Self {
            roster: Mutex::new(roster),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            join_requests: vec![JoinRequest {
                jid: "6284444444444@s.whatsapp.net".to_string(),
                display_name: Some("Pending".to_string()),
            }],
        }
    }

    /// Make every call of the named operation fail with a transport error
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn set_roster(&self, roster: GroupRoster) {
        *self.roster.lock().unwrap() = roster;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendText { message, .. } => Some(message.text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent_texts().pop()
    }

    fn record(&self, operation: &'static str, call: Call) -> GuardResult<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(GuardError::transport(operation, "simulated failure"));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn bot_id(&self) -> String {
        BOT_ID.to_string()
    }

    async fn send_text(&self, chat_id: &str, message: OutgoingText) -> GuardResult<()> {
        self.record("send_text", Call::SendText { chat_id: chat_id.to_string(), message })
    }

    async fn delete_message(&self, message: &MessageRef) -> GuardResult<()> {
        self.record("delete_message", Call::Delete { message_id: message.id.clone() })
    }

    async fn remove_participant(&self, chat_id: &str, participant: &str) -> GuardResult<()> {
        self.record(
            "remove_participant",
            Call::Remove { chat_id: chat_id.to_string(), participant: participant.to_string() },
        )
    }

    async fn update_participant(
        &self,
        chat_id: &str,
        participant: &str,
        action: ParticipantAction,
    ) -> GuardResult<()> {
        self.record(
            "update_participant",
            Call::UpdateParticipant {
                chat_id: chat_id.to_string(),
                participant: participant.to_string(),
                action,
            },
        )
    }

    async fn block_participant(&self, participant: &str) -> GuardResult<()> {
        self.record("block_participant", Call::Block { participant: participant.to_string() })
    }

    async fn get_group_roster(&self, _chat_id: &str) -> GuardResult<GroupRoster> {
        if self.failing.lock().unwrap().contains("get_group_roster") {
            return Err(GuardError::transport("get_group_roster", "simulated failure"));
        }
        Ok(self.roster.lock().unwrap().clone())
    }

    async fn update_subject(&self, chat_id: &str, subject: &str) -> GuardResult<()> {
        self.record(
            "update_subject",
            Call::UpdateSubject { chat_id: chat_id.to_string(), subject: subject.to_string() },
        )
    }

    async fn update_description(&self, chat_id: &str, description: &str) -> GuardResult<()> {
        self.record(
            "update_description",
            Call::UpdateDescription {
                chat_id: chat_id.to_string(),
                description: description.to_string(),
            },
        )
    }

    async fn set_announce_only(&self, chat_id: &str, enabled: bool) -> GuardResult<()> {
        self.record("set_announce_only", Call::AnnounceOnly { chat_id: chat_id.to_string(), enabled })
    }

    async fn set_ephemeral(&self, chat_id: &str, seconds: u32) -> GuardResult<()> {
        self.record("set_ephemeral", Call::Ephemeral { chat_id: chat_id.to_string(), seconds })
    }

    async fn set_member_add_mode(&self, chat_id: &str, mode: AddMode) -> GuardResult<()> {
        self.record("set_member_add_mode", Call::AddMode { chat_id: chat_id.to_string(), mode })
    }

    async fn invite_code(&self, chat_id: &str) -> GuardResult<String> {
        self.record("invite_code", Call::InviteCode { chat_id: chat_id.to_string() })?;
        Ok("InviteCode123".to_string())
    }

    async fn revoke_invite(&self, chat_id: &str) -> GuardResult<String> {
        self.record("revoke_invite", Call::RevokeInvite { chat_id: chat_id.to_string() })?;
        Ok("FreshCode456".to_string())
    }

    async fn leave_group(&self, chat_id: &str) -> GuardResult<()> {
        self.record("leave_group", Call::Leave { chat_id: chat_id.to_string() })
    }

    async fn join_requests(&self, chat_id: &str) -> GuardResult<Vec<JoinRequest>> {
        self.record("join_requests", Call::JoinRequests { chat_id: chat_id.to_string() })?;
        Ok(self.join_requests.clone())
    }

    async fn pin_message(&self, message: &MessageRef, pinned: bool) -> GuardResult<()> {
        self.record("pin_message", Call::Pin { message_id: message.id.clone(), pinned })
    }

    async fn set_group_picture(&self, chat_id: &str, _source: &MessageRef) -> GuardResult<()> {
        self.record("set_group_picture", Call::GroupPicture { chat_id: chat_id.to_string() })
    }

    async fn send_profile_card(
        &self,
        chat_id: &str,
        participant: &str,
        caption: &str,
        _mentions: Vec<String>,
    ) -> GuardResult<()> {
        self.record(
            "send_profile_card",
            Call::ProfileCard {
                chat_id: chat_id.to_string(),
                participant: participant.to_string(),
                caption: caption.to_string(),
            },
        )
    }
}
