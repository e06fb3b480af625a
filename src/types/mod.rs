// src/types/mod.rs - Chat records, group policy settings and the moderation vocabulary

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const USER_DOMAIN: &str = "@s.whatsapp.net";
pub const GROUP_DOMAIN: &str = "@g.us";
pub const UNKNOWN_GROUP: &str = "Unknown Group";
pub const ANONYMOUS: &str = "Anonymous";

// =================================================================
// IDENTITIES
// =================================================================

/// Whether the identity names a group conversation
pub fn is_group(jid: &str) -> bool {
    jid.ends_with(GROUP_DOMAIN)
}

/// Local part of an identity with any `:device` suffix removed
pub fn user_part(jid: &str) -> &str {
    let local = jid.split('@').next().unwrap_or(jid);
    local.split(':').next().unwrap_or(local)
}

/// Canonical user identity, e.g. `6281:3@s.whatsapp.net` -> `6281@s.whatsapp.net`
pub fn normalize_user(jid: &str) -> String {
    format!("{}{}", user_part(jid), USER_DOMAIN)
}

pub fn same_user(a: &str, b: &str) -> bool {
    user_part(a) == user_part(b)
}

/// Build a user identity from a free-form argument such as `+62 812-3456`
pub fn participant_from_arg(arg: &str) -> Option<String> {
    let digits: String = arg.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("{}{}", digits, USER_DOMAIN))
    }
}

/// Mention text as rendered in chat, e.g. `@6281234567890`
pub fn mention_tag(jid: &str) -> String {
    format!("@{}", user_part(jid))
}

// =================================================================
// PERSISTED RECORDS
// =================================================================

/// Whole persisted document: identity -> record
pub type ChatDatabase = BTreeMap<String, ChatRecord>;

/// A confirmed violation timestamp, stored as epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WarningStamp(#[serde(with = "ts_milliseconds")] pub DateTime<Utc>);

/// One record per conversation participant identity (person or group)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(rename = "name", default = "default_display_name")]
    pub display_name: String,
    #[serde(rename = "lastActivity", with = "ts_milliseconds", default = "Utc::now")]
    pub last_activity_at: DateTime<Utc>,
    #[serde(rename = "count", default)]
    pub message_count: u64,
    #[serde(rename = "groupSettings", default, skip_serializing_if = "Option::is_none")]
    pub group_settings: Option<GroupSettings>,
}

fn default_display_name() -> String {
    ANONYMOUS.to_string()
}

impl ChatRecord {
    pub fn new(display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            display_name: display_name.into(),
            last_activity_at: now,
            message_count: 0,
            group_settings: None,
        }
    }

    pub fn new_group(subject: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            group_settings: Some(GroupSettings::default()),
            ..Self::new(subject.unwrap_or(UNKNOWN_GROUP), now)
        }
    }

    /// Record one processed message
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.message_count += 1;
    }

    /// Group settings, created on first access for records that predate them
    pub fn group_settings_mut(&mut self) -> &mut GroupSettings {
        self.group_settings.get_or_insert_with(GroupSettings::default)
    }
}

/// Policy toggles and warning history attached to a group record.
///
/// Field names match the on-disk layout of existing databases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub goodbye_message: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub welcome_with_pp: bool,
    #[serde(rename = "antitoxic", default, deserialize_with = "null_as_default")]
    pub anti_toxic: bool,
    #[serde(rename = "antilink", default, deserialize_with = "null_as_default")]
    pub anti_link: bool,
    #[serde(rename = "antivirtex", default, deserialize_with = "null_as_default")]
    pub anti_virtex: bool,
    #[serde(rename = "antirusuh", default, deserialize_with = "null_as_default")]
    pub anti_flood: bool,
    #[serde(rename = "antinsfw", default, deserialize_with = "null_as_default")]
    pub anti_nsfw: bool,
    #[serde(rename = "antipromosi", default, deserialize_with = "null_as_default")]
    pub anti_promotion: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_muted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: HashMap<String, Vec<WarningStamp>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl GroupSettings {
    pub fn policy_enabled(&self, kind: ViolationKind) -> bool {
        match kind {
            ViolationKind::Toxic => self.anti_toxic,
            ViolationKind::Link => self.anti_link,
            ViolationKind::Virtex => self.anti_virtex,
            ViolationKind::Nsfw => self.anti_nsfw,
            ViolationKind::Promotion => self.anti_promotion,
            ViolationKind::Flood => self.anti_flood,
        }
    }

    pub fn set_policy(&mut self, kind: ViolationKind, enabled: bool) {
        let slot = match kind {
            ViolationKind::Toxic => &mut self.anti_toxic,
            ViolationKind::Link => &mut self.anti_link,
            ViolationKind::Virtex => &mut self.anti_virtex,
            ViolationKind::Nsfw => &mut self.anti_nsfw,
            ViolationKind::Promotion => &mut self.anti_promotion,
            ViolationKind::Flood => &mut self.anti_flood,
        };
        *slot = enabled;
    }
}

// =================================================================
// MODERATION VOCABULARY
// =================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Toxic,
    Link,
    Virtex,
    Nsfw,
    Promotion,
    Flood,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 6] = [
        ViolationKind::Toxic,
        ViolationKind::Link,
        ViolationKind::Virtex,
        ViolationKind::Nsfw,
        ViolationKind::Promotion,
        ViolationKind::Flood,
    ];

    /// Name of the policy, which doubles as the toggle command
    pub fn policy_name(self) -> &'static str {
        match self {
            ViolationKind::Toxic => "anti_toxic",
            ViolationKind::Link => "anti_link",
            ViolationKind::Virtex => "anti_virtex",
            ViolationKind::Nsfw => "anti_nsfw",
            ViolationKind::Promotion => "anti_promo",
            ViolationKind::Flood => "anti_flood",
        }
    }

    pub fn from_policy_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.policy_name() == name)
    }

    /// Virtex payloads and explicit content skip the warning ladder
    pub fn severity(self) -> Severity {
        match self {
            ViolationKind::Virtex | ViolationKind::Nsfw => Severity::Immediate,
            _ => Severity::Warn,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::Toxic => "toxic language",
            ViolationKind::Link => "link",
            ViolationKind::Virtex => "virtex payload",
            ViolationKind::Nsfw => "NSFW content",
            ViolationKind::Promotion => "promotion",
            ViolationKind::Flood => "spam/flood",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warn,
    Immediate,
}

/// Output of classification, consumed immediately by the warning ladder
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEvent {
    pub offender: String,
    pub group: String,
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

/// Authority sources for one sender in one group, computed fresh per message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionContext {
    /// The sender is the acting agent itself
    pub sender_is_bot_admin: bool,
    pub sender_is_group_admin: bool,
    pub sender_is_group_owner: bool,
    pub sender_is_configured_owner: bool,
    /// The acting agent holds administrator capability in the group
    pub bot_is_admin: bool,
}

impl PermissionContext {
    /// Any single source is sufficient; there is no way to subtract authority
    pub fn sender_is_authorized(&self) -> bool {
        self.sender_is_group_admin || self.sender_is_group_owner || self.sender_is_configured_owner
    }

    /// Senders whose messages are never run through the classifiers
    pub fn sender_is_exempt(&self) -> bool {
        self.sender_is_bot_admin || self.sender_is_authorized()
    }
}

// =================================================================
// GROUP ROSTER
// =================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    #[default]
    Member,
    Admin,
    Superadmin,
}

impl ParticipantRole {
    pub fn is_admin(self) -> bool {
        !matches!(self, ParticipantRole::Member)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRoster {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub ephemeral_duration: u32,
}

impl GroupRoster {
    /// Role of a member; `None` when the identity is not in the group
    pub fn role_of(&self, jid: &str) -> Option<ParticipantRole> {
        self.participants
            .iter()
            .find(|p| same_user(&p.id, jid))
            .map(|p| p.role)
    }

    pub fn is_admin(&self, jid: &str) -> bool {
        self.role_of(jid).map_or(false, ParticipantRole::is_admin)
    }

    pub fn is_owner(&self, jid: &str) -> bool {
        self.owner.as_deref().map_or(false, |owner| same_user(owner, jid))
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub jid: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// =================================================================
// INBOUND EVENTS
// =================================================================

/// Address of a delivered message, used for deletion, quoting and pinning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub chat_id: String,
    pub id: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub participant: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsResponse {
    #[serde(default)]
    pub selected_display_text: Option<String>,
    #[serde(default)]
    pub selected_button_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub selected_row_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateReply {
    #[serde(default)]
    pub selected_display_text: Option<String>,
    #[serde(default)]
    pub selected_id: Option<String>,
}

/// Alternative shapes a message body can take; normally only one is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text: Option<String>,
    #[serde(default)]
    pub image_caption: Option<String>,
    #[serde(default)]
    pub video_caption: Option<String>,
    #[serde(default)]
    pub document_caption: Option<String>,
    #[serde(default)]
    pub buttons_content_text: Option<String>,
    #[serde(default)]
    pub buttons_response: Option<ButtonsResponse>,
    #[serde(default)]
    pub list_description: Option<String>,
    #[serde(default)]
    pub list_response: Option<ListResponse>,
    /// Raw `paramsJson` of an interactive native-flow response
    #[serde(default)]
    pub interactive_params_json: Option<String>,
    #[serde(default)]
    pub template_reply: Option<TemplateReply>,
    #[serde(default)]
    pub reaction_text: Option<String>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Reply context attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(default)]
    pub quoted_participant: Option<String>,
    #[serde(default)]
    pub has_quoted_message: bool,
    #[serde(default)]
    pub has_image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub chat_id: String,
    /// Sending participant; equal to `chat_id` in direct chats
    pub sender: String,
    #[serde(default)]
    pub from_me: bool,
    pub message_id: String,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub payload: MessagePayload,
    #[serde(default)]
    pub context: MessageContext,
}

impl InboundMessage {
    pub fn is_group(&self) -> bool {
        is_group(&self.chat_id)
    }

    /// Canonical sender; the agent's own messages are attributed to `bot_id`
    pub fn effective_sender(&self, bot_id: &str) -> String {
        if self.from_me {
            normalize_user(bot_id)
        } else {
            normalize_user(&self.sender)
        }
    }

    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id.clone(),
            id: self.message_id.clone(),
            from_me: self.from_me,
            participant: if self.is_group() { Some(self.sender.clone()) } else { None },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsUpdate {
    pub chat_id: String,
    pub participants: Vec<String>,
    pub action: ParticipantAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    pub chat_id: String,
    #[serde(default)]
    pub subject: Option<String>,
}

/// Everything the transport can deliver to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(InboundMessage),
    Participants(ParticipantsUpdate),
    Group(GroupUpdate),
}

// =================================================================
// OUTBOUND
// =================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddMode {
    AllMembers,
    AdminsOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<MessageRef>,
}

impl OutgoingText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn mentioning(mut self, mentions: Vec<String>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn quoting(mut self, quoted: MessageRef) -> Self {
        self.quoted = Some(quoted);
        self
    }
}

// =================================================================
// ERRORS
// =================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read chat database {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write chat database {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("chat database is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("chat database could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("chat database lock poisoned")]
    Poisoned,
}

/// Failure taxonomy of the engine; none of these is fatal to the process
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("malformed message payload: {0}")]
    Classification(String),
    #[error("bot lacks the rights to {action} in {chat}")]
    Capability { chat: String, action: String },
    #[error("{sender} is not allowed to use {command}")]
    PermissionDenied { sender: String, command: String },
    #[error("transport call `{operation}` failed: {reason}")]
    Transport { operation: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GuardError {
    pub fn transport(operation: &str, reason: impl fmt::Display) -> Self {
        GuardError::Transport {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_helpers() {
        assert_eq!(user_part("6281234:12@s.whatsapp.net"), "6281234");
        assert_eq!(normalize_user("6281234:12@s.whatsapp.net"), "6281234@s.whatsapp.net");
        assert!(is_group("1203630@g.us"));
        assert!(!is_group("6281234@s.whatsapp.net"));
        assert_eq!(
            participant_from_arg("+62 812-3456").as_deref(),
            Some("628123456@s.whatsapp.net")
        );
        assert_eq!(participant_from_arg("nobody"), None);
        assert_eq!(mention_tag("6281@s.whatsapp.net"), "@6281");
    }

    #[test]
    fn test_legacy_group_record_is_repaired() {
        let raw = r#"{
            "name": "Old Group",
            "lastActivity": 1700000000000,
            "count": 3,
            "groupSettings": { "antitoxic": true, "antirusuh": null, "warnings": null }
        }"#;
        let record: ChatRecord = serde_json::from_str(raw).unwrap();
        let settings = record.group_settings.unwrap();
        assert!(settings.anti_toxic);
        assert!(!settings.anti_flood);
        assert!(settings.warnings.is_empty());
        assert_eq!(record.message_count, 3);
    }

    #[test]
    fn test_warning_stamps_round_trip_as_millis() {
        let mut settings = GroupSettings::default();
        let stamp = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        settings.warnings.insert("a@s.whatsapp.net".into(), vec![WarningStamp(stamp)]);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["warnings"]["a@s.whatsapp.net"][0], 1_700_000_000_123i64);
    }

    #[test]
    fn test_permission_context_is_a_pure_or() {
        let none = PermissionContext::default();
        assert!(!none.sender_is_authorized());

        for ctx in [
            PermissionContext { sender_is_group_admin: true, ..none },
            PermissionContext { sender_is_group_owner: true, ..none },
            PermissionContext { sender_is_configured_owner: true, ..none },
        ] {
            assert!(ctx.sender_is_authorized());
            assert!(ctx.sender_is_exempt());
        }

        let self_sent = PermissionContext { sender_is_bot_admin: true, ..none };
        assert!(!self_sent.sender_is_authorized());
        assert!(self_sent.sender_is_exempt());
    }

    #[test]
    fn test_roster_roles() {
        let roster = GroupRoster {
            subject: Some("Test".into()),
            owner: Some("1@s.whatsapp.net".into()),
            participants: vec![
                Participant { id: "1@s.whatsapp.net".into(), role: ParticipantRole::Superadmin },
                Participant { id: "2@s.whatsapp.net".into(), role: ParticipantRole::Member },
            ],
            ephemeral_duration: 0,
        };
        assert!(roster.is_admin("1:4@s.whatsapp.net"));
        assert!(!roster.is_admin("2@s.whatsapp.net"));
        assert!(!roster.is_admin("3@s.whatsapp.net"));
        assert!(roster.is_owner("1@s.whatsapp.net"));
    }

    #[test]
    fn test_inbound_event_decodes_from_bridge_json() {
        let raw = r#"{
            "kind": "message",
            "chatId": "120363@g.us",
            "sender": "6281@s.whatsapp.net",
            "messageId": "ABC",
            "payload": { "conversation": "hello" }
        }"#;
        match serde_json::from_str::<InboundEvent>(raw).unwrap() {
            InboundEvent::Message(msg) => {
                assert!(msg.is_group());
                assert_eq!(msg.payload.conversation.as_deref(), Some("hello"));
                assert!(!msg.from_me);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
