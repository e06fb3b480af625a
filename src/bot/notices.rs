// src/bot/notices.rs - User-facing notice texts

use crate::bot::commands::{CommandSpec, MenuSection, COMMAND_TABLE};
use crate::types::{mention_tag, GroupSettings, ViolationKind};

fn icon(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::Toxic | ViolationKind::Promotion => "🚫",
        ViolationKind::Link => "🔗",
        ViolationKind::Virtex => "👾",
        ViolationKind::Nsfw => "🔞",
        ViolationKind::Flood => "⚠️",
    }
}

fn detected(kind: ViolationKind, offender: &str) -> String {
    let label = kind.to_string();
    let mut chars = label.chars();
    let label = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => label,
    };
    format!("{} {} detected from {}!", icon(kind), label, mention_tag(offender))
}

pub fn warned(kind: ViolationKind, offender: &str, count: usize, limit: usize) -> String {
    let advice = match kind {
        ViolationKind::Toxic => " Please watch your language.",
        ViolationKind::Link => " Links are not allowed in this group.",
        ViolationKind::Promotion => " Promoting other groups or channels is not allowed.",
        _ => "",
    };
    format!("{} ({}/{}){}", detected(kind, offender), count, limit, advice)
}

pub fn escalated(kind: ViolationKind, offender: &str, limit: usize) -> String {
    format!(
        "{} ({}/{})\n👋 {} has been removed for reaching {} violations ({}).",
        detected(kind, offender),
        limit,
        limit,
        mention_tag(offender),
        limit,
        kind
    )
}

pub fn escalation_failed(kind: ViolationKind, offender: &str, limit: usize) -> String {
    format!(
        "{} ({}/{})\n⚠️ Failed to remove {}. The bot may lack permission or the user is an admin.",
        detected(kind, offender),
        limit,
        limit,
        mention_tag(offender)
    )
}

pub fn immediate(kind: ViolationKind, offender: &str) -> String {
    format!(
        "🔥 {} has been *removed and blocked* for sending {}!",
        mention_tag(offender),
        kind
    )
}

pub fn immediate_failed(kind: ViolationKind, offender: &str) -> String {
    format!(
        "⚠️ Could not remove and block {} for {}. The bot may lack permission or the user is an admin.",
        mention_tag(offender),
        kind
    )
}

pub fn no_capability(kind: ViolationKind, offender: &str) -> String {
    format!(
        "{} The bot is not an admin, so the message was not deleted and no action was taken.",
        detected(kind, offender)
    )
}

pub fn bot_not_admin(invocation: &str) -> String {
    format!("Bot must be a group admin to use the `{}` command.", invocation)
}

pub fn sender_not_authorized(invocation: &str) -> String {
    format!(
        "You must be a group admin or owner (including bot owner) to use the `{}` command.",
        invocation
    )
}

pub fn group_only(prefix: &str) -> String {
    format!(
        "This command is only for groups. Use `{}groupmenu` inside a group to see the commands.",
        prefix
    )
}

pub fn usage(prefix: &str, spec: &CommandSpec) -> String {
    format!("Usage: `{}{} {}`", prefix, spec.name, spec.usage)
}

pub fn placeholders_hint() -> &'static str {
    "\n\nAvailable variables:\n{name} - User's name\n{group} - Group's name"
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}

/// Command list with the live state of each protection toggle
pub fn group_menu(prefix: &str, group_name: &str, settings: &GroupSettings) -> String {
    let mut menu = format!("👥 *GROUP COMMANDS*\nGroup: {}\n", group_name);

    for (section, title) in [
        (MenuSection::Settings, "⚙️ GROUP SETTINGS"),
        (MenuSection::Protection, "🛡️ GROUP PROTECTION"),
        (MenuSection::Tagging, "💬 TAGGING"),
    ] {
        menu.push_str(&format!("\n*{}*\n", title));
        for spec in COMMAND_TABLE.iter().filter(|s| s.section == section) {
            let line = format!("{}{} {}", prefix, spec.name, spec.usage);
            let line = line.trim_end();
            match ViolationKind::from_policy_name(spec.name) {
                Some(kind) => menu.push_str(&format!(
                    "• {} (Current: {})\n",
                    line,
                    on_off(settings.policy_enabled(kind))
                )),
                None => menu.push_str(&format!("• {}\n", line)),
            }
        }
    }
    menu.trim_end().to_string()
}

pub fn policy_toggled(kind: ViolationKind, enabled: bool) -> String {
    format!(
        "*{}* in this group has been turned *{}*.",
        kind.policy_name().replace('_', " ").to_uppercase(),
        on_off(enabled)
    )
}
