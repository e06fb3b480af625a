// src/bot/commands.rs - Command table and command recognition

use log::debug;

use crate::config::CommandSettings;
use crate::types::ViolationKind;

/// Handler a table entry dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCommand {
    GroupMenu,
    Welcome,
    Goodbye,
    WelcomePp,
    SetGroupIcon,
    SetGroupName,
    SetGroupDesc,
    MuteGroup,
    UnmuteGroup,
    ToggleEphemeral,
    SetAddMode,
    Add,
    Kick,
    Promote,
    Demote,
    LeaveGroup,
    GetInvite,
    RevokeInvite,
    JoinRequests,
    PinMessage,
    UnpinMessage,
    TogglePolicy(ViolationKind),
    HideTag,
    TagAll,
    ToTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuSection {
    Settings,
    Protection,
    Tagging,
    Hidden,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub command: GroupCommand,
    /// The bot must hold admin rights in the group
    pub requires_bot_admin: bool,
    /// The sender must be a group admin, the group owner or a configured owner
    pub requires_sender_auth: bool,
    /// Argument hint shown in the menu and in usage notices
    pub usage: &'static str,
    pub section: MenuSection,
}

const fn open(name: &'static str, command: GroupCommand, section: MenuSection) -> CommandSpec {
    CommandSpec {
        name,
        command,
        requires_bot_admin: false,
        requires_sender_auth: false,
        usage: "",
        section,
    }
}

const fn gated(
    name: &'static str,
    command: GroupCommand,
    usage: &'static str,
    section: MenuSection,
) -> CommandSpec {
    CommandSpec {
        name,
        command,
        requires_bot_admin: true,
        requires_sender_auth: true,
        usage,
        section,
    }
}

use GroupCommand as C;
use MenuSection as S;

/// Every recognized command name. Recognition, moderation suppression and
/// dispatch all read this one table.
pub static COMMAND_TABLE: &[CommandSpec] = &[
    open("groupmenu", C::GroupMenu, S::Hidden),
    open("menu", C::GroupMenu, S::Hidden),
    gated("welcome", C::Welcome, "<message>", S::Settings),
    gated("goodbye", C::Goodbye, "<message>", S::Settings),
    gated("welcomepp", C::WelcomePp, "<message>", S::Settings),
    gated("setgroupicon", C::SetGroupIcon, "(with an image)", S::Settings),
    gated("setgroupname", C::SetGroupName, "<name>", S::Settings),
    gated("setgroupdesc", C::SetGroupDesc, "<description>", S::Settings),
    gated("mutegroup", C::MuteGroup, "", S::Settings),
    gated("unmutegroup", C::UnmuteGroup, "", S::Settings),
    gated("toggleephemeral", C::ToggleEphemeral, "", S::Settings),
    gated("setaddmode", C::SetAddMode, "<all_members|admins_only>", S::Settings),
    gated("add", C::Add, "<number|reply>", S::Settings),
    gated("kick", C::Kick, "<number|reply>", S::Settings),
    gated("promote", C::Promote, "<number>", S::Settings),
    gated("demote", C::Demote, "<number>", S::Settings),
    gated("leavegroup", C::LeaveGroup, "", S::Settings),
    gated("getinvite", C::GetInvite, "", S::Settings),
    gated("revokeinvite", C::RevokeInvite, "", S::Settings),
    gated("joinrequests", C::JoinRequests, "", S::Settings),
    gated("pinmsg", C::PinMessage, "", S::Settings),
    gated("unpinmsg", C::UnpinMessage, "", S::Settings),
    gated("anti_toxic", C::TogglePolicy(ViolationKind::Toxic), "<on|off>", S::Protection),
    gated("anti_link", C::TogglePolicy(ViolationKind::Link), "<on|off>", S::Protection),
    gated("anti_virtex", C::TogglePolicy(ViolationKind::Virtex), "<on|off>", S::Protection),
    gated("anti_flood", C::TogglePolicy(ViolationKind::Flood), "<on|off>", S::Protection),
    gated("anti_nsfw", C::TogglePolicy(ViolationKind::Nsfw), "<on|off>", S::Protection),
    gated("anti_promo", C::TogglePolicy(ViolationKind::Promotion), "<on|off>", S::Protection),
    gated("hidetag", C::HideTag, "<message>", S::Tagging),
    gated("tagall", C::TagAll, "[message]", S::Tagging),
    gated("totag", C::ToTag, "[message] (reply)", S::Tagging),
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.iter().find(|spec| spec.name == name)
}

/// A command found in message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedCommand {
    pub spec: &'static CommandSpec,
    /// Prefix as configured; empty when prefix mode is off
    pub prefix: String,
    pub args: String,
}

impl RecognizedCommand {
    /// Invocation as the user would type it, e.g. `!kick`
    pub fn invocation(&self) -> String {
        format!("{}{}", self.prefix, self.spec.name)
    }
}

pub struct CommandRecognizer {
    prefix_enabled: bool,
    prefixes: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(settings: &CommandSettings) -> Self {
        Self {
            prefix_enabled: settings.prefix_enabled,
            prefixes: settings
                .prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn recognize(&self, text: &str) -> Option<RecognizedCommand> {
        if !self.prefix_enabled {
            return match_table(text.trim(), "");
        }

        self.prefixes.iter().find_map(|prefix| {
            let rest = strip_prefix_ignore_case(text, prefix)?;
            match_table(rest.trim_start(), prefix)
        })
    }

    pub fn is_command(&self, text: &str) -> bool {
        self.recognize(text).is_some()
    }
}

fn match_table(body: &str, prefix: &str) -> Option<RecognizedCommand> {
    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };
    let spec = find_command(&name.to_lowercase())?;
    debug!("Recognized command {}{} with args {:?}", prefix, spec.name, args);
    Some(RecognizedCommand {
        spec,
        prefix: prefix.to_string(),
        args: args.to_string(),
    })
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let rest = chars.next().map_or(text.len(), |(index, _)| index);
    Some(&text[rest..])
}
