// src/bot/group_commands.rs - Handlers for the group administration commands

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;

use crate::bot::commands::{GroupCommand, RecognizedCommand};
use crate::bot::notices;
use crate::platforms::Transport;
use crate::store::SharedStore;
use crate::types::{
    participant_from_arg, user_part, AddMode, ChatRecord, GroupRoster, GroupSettings, GuardResult,
    InboundMessage, OutgoingText, ParticipantAction, ViolationKind, ANONYMOUS,
};

/// Disappearing-message duration used when turning the feature on (7 days)
pub const DEFAULT_EPHEMERAL_SECONDS: u32 = 7 * 24 * 60 * 60;

const INVITE_BASE: &str = "https://chat.whatsapp.com/";

/// Everything a handler may look at for one authorized invocation
pub struct CommandContext<'a> {
    pub msg: &'a InboundMessage,
    pub command: &'a RecognizedCommand,
    pub roster: &'a GroupRoster,
    pub group_name: String,
    /// Settings as stored when the command arrived
    pub settings: GroupSettings,
    pub now: DateTime<Utc>,
}

impl CommandContext<'_> {
    fn chat_id(&self) -> &str {
        &self.msg.chat_id
    }

    fn args(&self) -> &str {
        &self.command.args
    }

    fn usage(&self) -> String {
        notices::usage(&self.command.prefix, self.command.spec)
    }

    /// Target from the replied-to message, else from the argument's digits
    fn target(&self, allow_reply: bool) -> Option<(String, String)> {
        if allow_reply {
            if let Some(quoted) = &self.msg.context.quoted_participant {
                return Some((quoted.clone(), user_part(quoted).to_string()));
            }
        }
        participant_from_arg(self.args()).map(|jid| (jid, self.args().to_string()))
    }
}

pub struct GroupCommandHandlers {
    store: SharedStore,
    transport: Arc<dyn Transport>,
}

impl GroupCommandHandlers {
    pub fn new(store: SharedStore, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Run the handler for an already authorized command.
    /// Transport failures become notices; only store failures are returned.
    pub async fn dispatch(&self, ctx: &CommandContext<'_>) -> GuardResult<()> {
        match ctx.command.spec.command {
            GroupCommand::GroupMenu => {
                let menu = notices::group_menu(&ctx.command.prefix, &ctx.group_name, &ctx.settings);
                self.reply(ctx, menu).await;
            }
            GroupCommand::Welcome => self.set_welcome(ctx, false).await?,
            GroupCommand::WelcomePp => self.set_welcome(ctx, true).await?,
            GroupCommand::Goodbye => self.set_goodbye(ctx).await?,
            GroupCommand::SetGroupIcon => self.set_group_icon(ctx).await,
            GroupCommand::SetGroupName => {
                if ctx.args().is_empty() {
                    self.reply(ctx, ctx.usage()).await;
                    return Ok(());
                }
                let result = self.transport.update_subject(ctx.chat_id(), ctx.args()).await;
                self.report(
                    ctx,
                    result,
                    format!("Group name changed to: \"{}\".", ctx.args()),
                    "Failed to change group name.",
                )
                .await;
            }
            GroupCommand::SetGroupDesc => {
                if ctx.args().is_empty() {
                    self.reply(ctx, ctx.usage()).await;
                    return Ok(());
                }
                let result = self.transport.update_description(ctx.chat_id(), ctx.args()).await;
                self.report(
                    ctx,
                    result,
                    format!("Group description changed to: \"{}\".", ctx.args()),
                    "Failed to change group description.",
                )
                .await;
            }
            GroupCommand::MuteGroup => self.set_muted(ctx, true).await?,
            GroupCommand::UnmuteGroup => self.set_muted(ctx, false).await?,
            GroupCommand::ToggleEphemeral => self.toggle_ephemeral(ctx).await,
            GroupCommand::SetAddMode => self.set_add_mode(ctx).await,
            GroupCommand::Add => self.add_or_kick(ctx, ParticipantAction::Add).await,
            GroupCommand::Kick => self.add_or_kick(ctx, ParticipantAction::Remove).await,
            GroupCommand::Promote => self.change_role(ctx, ParticipantAction::Promote).await,
            GroupCommand::Demote => self.change_role(ctx, ParticipantAction::Demote).await,
            GroupCommand::LeaveGroup => match self.transport.leave_group(ctx.chat_id()).await {
                Ok(()) => info!("Left group {}", ctx.chat_id()),
                Err(e) => error!("Failed to leave group {}: {}", ctx.chat_id(), e),
            },
            GroupCommand::GetInvite => {
                match self.transport.invite_code(ctx.chat_id()).await {
                    Ok(code) => {
                        self.reply(ctx, format!("Group invite code: {}{}", INVITE_BASE, code)).await
                    }
                    Err(e) => {
                        warn!("Invite code for {} unavailable: {}", ctx.chat_id(), e);
                        self.reply(ctx, "Failed to get invite code.").await
                    }
                }
            }
            GroupCommand::RevokeInvite => {
                match self.transport.revoke_invite(ctx.chat_id()).await {
                    Ok(code) => self.reply(ctx, format!("New invite code: {}{}", INVITE_BASE, code)).await,
                    Err(e) => {
                        warn!("Failed to revoke invite for {}: {}", ctx.chat_id(), e);
                        self.reply(ctx, "Failed to revoke invite code.").await
                    }
                }
            }
            GroupCommand::JoinRequests => self.list_join_requests(ctx).await,
            GroupCommand::PinMessage => self.pin(ctx, true).await,
            GroupCommand::UnpinMessage => self.pin(ctx, false).await,
            GroupCommand::TogglePolicy(kind) => self.toggle_policy(ctx, kind).await?,
            GroupCommand::HideTag => {
                if ctx.args().is_empty() {
                    self.reply(ctx, ctx.usage()).await;
                    return Ok(());
                }
                self.mention_all(ctx, ctx.args().to_string(), false).await;
            }
            GroupCommand::TagAll => {
                let text = if ctx.args().is_empty() { "All group members!" } else { ctx.args() };
                self.mention_all(ctx, text.to_string(), false).await;
            }
            GroupCommand::ToTag => {
                if !ctx.msg.context.has_quoted_message {
                    let hint = format!(
                        "Reply to the message you want to tag with `{}` to mention all members.",
                        ctx.command.invocation()
                    );
                    self.reply(ctx, hint).await;
                    return Ok(());
                }
                self.mention_all(ctx, ctx.args().to_string(), true).await;
            }
        }
        Ok(())
    }

    async fn reply(&self, ctx: &CommandContext<'_>, text: impl Into<String>) {
        self.send(ctx.chat_id(), OutgoingText::new(text)).await;
    }

    async fn send(&self, chat_id: &str, message: OutgoingText) {
        if let Err(e) = self.transport.send_text(chat_id, message).await {
            warn!("Failed to reply in {}: {}", chat_id, e);
        }
    }

    /// Success or failure notice for a single transport call
    async fn report(
        &self,
        ctx: &CommandContext<'_>,
        result: GuardResult<()>,
        success: String,
        failure: &str,
    ) {
        match result {
            Ok(()) => self.reply(ctx, success).await,
            Err(e) => {
                warn!("{} failed in {}: {}", ctx.command.spec.name, ctx.chat_id(), e);
                self.reply(ctx, failure).await;
            }
        }
    }

    async fn update_settings<F>(&self, ctx: &CommandContext<'_>, apply: F) -> GuardResult<()>
    where
        F: FnOnce(&mut GroupSettings),
    {
        let group_name = ctx.group_name.as_str();
        self.store
            .transaction(|db| {
                let group = db
                    .entry(ctx.chat_id().to_string())
                    .or_insert_with(|| ChatRecord::new_group(Some(group_name), ctx.now));
                apply(group.group_settings_mut());
            })
            .await?;
        Ok(())
    }

    async fn set_welcome(&self, ctx: &CommandContext<'_>, with_picture: bool) -> GuardResult<()> {
        if ctx.args().is_empty() {
            let mut usage = ctx.usage();
            if with_picture {
                usage.push_str("\n\nThe new member's profile picture is sent with the message.");
            }
            usage.push_str(notices::placeholders_hint());
            self.reply(ctx, usage).await;
            return Ok(());
        }

        let message = ctx.args().to_string();
        self.update_settings(ctx, |settings| {
            settings.welcome_message = Some(message);
            settings.welcome_with_pp = with_picture;
        })
        .await?;

        let confirmation = if with_picture {
            "Welcome message with user profile picture set successfully."
        } else {
            "Welcome message set successfully."
        };
        self.reply(ctx, confirmation).await;
        Ok(())
    }

    async fn set_goodbye(&self, ctx: &CommandContext<'_>) -> GuardResult<()> {
        if ctx.args().is_empty() {
            let usage = format!("{}{}", ctx.usage(), notices::placeholders_hint());
            self.reply(ctx, usage).await;
            return Ok(());
        }

        let message = ctx.args().to_string();
        self.update_settings(ctx, |settings| settings.goodbye_message = Some(message))
            .await?;
        self.reply(ctx, "Goodbye message set successfully.").await;
        Ok(())
    }

    async fn set_group_icon(&self, ctx: &CommandContext<'_>) {
        if !ctx.msg.context.has_image {
            let hint = format!(
                "Send an image with the caption `{}` to set the group profile picture.",
                ctx.command.invocation()
            );
            return self.reply(ctx, hint).await;
        }
        let result = self
            .transport
            .set_group_picture(ctx.chat_id(), &ctx.msg.message_ref())
            .await;
        self.report(
            ctx,
            result,
            "Group profile picture changed successfully.".to_string(),
            "Failed to change group profile picture. Make sure this is a valid image.",
        )
        .await;
    }

    async fn set_muted(&self, ctx: &CommandContext<'_>, muted: bool) -> GuardResult<()> {
        if let Err(e) = self.transport.set_announce_only(ctx.chat_id(), muted).await {
            warn!("Failed to change announce mode of {}: {}", ctx.chat_id(), e);
            let failure = if muted { "Failed to mute group." } else { "Failed to unmute group." };
            self.reply(ctx, failure).await;
            return Ok(());
        }

        self.update_settings(ctx, |settings| settings.is_muted = muted).await?;
        let confirmation = if muted {
            "This group has been muted (only admins can send messages)."
        } else {
            "This group has been unmuted (all members can send messages)."
        };
        self.reply(ctx, confirmation).await;
        Ok(())
    }

    async fn toggle_ephemeral(&self, ctx: &CommandContext<'_>) {
        let seconds = if ctx.roster.ephemeral_duration == 0 {
            DEFAULT_EPHEMERAL_SECONDS
        } else {
            0
        };
        let state = if seconds == 0 { "OFF" } else { "ON" };
        let result = self.transport.set_ephemeral(ctx.chat_id(), seconds).await;
        self.report(
            ctx,
            result,
            format!(
                "Disappearing messages in this group have been turned {} (default duration: 7 days).",
                state
            ),
            "Failed to toggle disappearing messages in the group.",
        )
        .await;
    }

    async fn set_add_mode(&self, ctx: &CommandContext<'_>) {
        let requested = ctx.args().to_lowercase();
        let mode = match requested.as_str() {
            "all_members" => AddMode::AllMembers,
            "admins_only" => AddMode::AdminsOnly,
            _ => {
                let hint = format!(
                    "Invalid add mode. Use: `{} {}`",
                    ctx.command.invocation(),
                    ctx.command.spec.usage
                );
                return self.reply(ctx, hint).await;
            }
        };
        let result = self.transport.set_member_add_mode(ctx.chat_id(), mode).await;
        self.report(
            ctx,
            result,
            format!("Group member add mode changed to: \"{}\".", requested),
            "Failed to change group member add mode.",
        )
        .await;
    }

    async fn add_or_kick(&self, ctx: &CommandContext<'_>, action: ParticipantAction) {
        let Some((target, label)) = ctx.target(true) else {
            return self.reply(ctx, ctx.usage()).await;
        };

        let (result, success, failure) = match action {
            ParticipantAction::Add => (
                self.transport.update_participant(ctx.chat_id(), &target, action).await,
                format!("Successfully added {}.", label),
                format!(
                    "Failed to add {}. Make sure the number is valid and they are not already in the group.",
                    label
                ),
            ),
            _ => (
                self.transport.remove_participant(ctx.chat_id(), &target).await,
                format!("Successfully removed {}.", label),
                format!(
                    "Failed to remove {}. Make sure the number is valid and they are in the group.",
                    label
                ),
            ),
        };
        self.report(ctx, result, success, &failure).await;
    }

    async fn change_role(&self, ctx: &CommandContext<'_>, action: ParticipantAction) {
        let Some((target, label)) = ctx.target(false) else {
            return self.reply(ctx, ctx.usage()).await;
        };
        let verb = if action == ParticipantAction::Promote { "promote" } else { "demote" };
        let result = self.transport.update_participant(ctx.chat_id(), &target, action).await;
        self.report(
            ctx,
            result,
            format!("Successfully {}d {}.", verb, label),
            &format!("Failed to {} participant. Make sure the number is valid.", verb),
        )
        .await;
    }

    async fn list_join_requests(&self, ctx: &CommandContext<'_>) {
        let requests = match self.transport.join_requests(ctx.chat_id()).await {
            Ok(requests) => requests,
            Err(e) => {
                warn!("Join requests for {} unavailable: {}", ctx.chat_id(), e);
                return self.reply(ctx, "Failed to get join requests.").await;
            }
        };

        if requests.is_empty() {
            return self.reply(ctx, "No pending join requests.").await;
        }
        let mut list = String::from("*Group Join Requests:*\n\n");
        for request in &requests {
            list.push_str(&format!(
                "- {} ({})\n",
                user_part(&request.jid),
                request.display_name.as_deref().unwrap_or(ANONYMOUS)
            ));
        }
        self.reply(ctx, list.trim_end()).await;
    }

    async fn pin(&self, ctx: &CommandContext<'_>, pinned: bool) {
        let result = self.transport.pin_message(&ctx.msg.message_ref(), pinned).await;
        let state = if pinned { "pinned" } else { "unpinned" };
        self.report(
            ctx,
            result,
            format!("Message {} successfully.", state),
            "Failed to pin/unpin message.",
        )
        .await;
    }

    async fn toggle_policy(&self, ctx: &CommandContext<'_>, kind: ViolationKind) -> GuardResult<()> {
        let enabled = match ctx.args().to_lowercase().as_str() {
            "on" => true,
            "off" => false,
            _ => {
                self.reply(ctx, ctx.usage()).await;
                return Ok(());
            }
        };

        self.update_settings(ctx, |settings| settings.set_policy(kind, enabled))
            .await?;
        info!(
            "{} turned {} in {}",
            kind.policy_name(),
            if enabled { "on" } else { "off" },
            ctx.chat_id()
        );
        self.reply(ctx, notices::policy_toggled(kind, enabled)).await;
        Ok(())
    }

    async fn mention_all(&self, ctx: &CommandContext<'_>, text: String, quote: bool) {
        let mut message = OutgoingText::new(text).mentioning(ctx.roster.member_ids());
        if quote {
            message = message.quoting(ctx.msg.message_ref());
        }
        self.send(ctx.chat_id(), message).await;
    }
}
