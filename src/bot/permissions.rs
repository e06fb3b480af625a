// src/bot/permissions.rs - Authority resolution for moderation exemption and command gating

use log::debug;

use crate::bot::commands::CommandSpec;
use crate::types::{normalize_user, same_user, GroupRoster, GuardError, PermissionContext};

/// Merges roster roles, group ownership and the configured owner list
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    owners: Vec<String>,
}

impl PermissionResolver {
    pub fn new(owners: &[String]) -> Self {
        Self {
            owners: owners.iter().map(|o| normalize_user(o)).collect(),
        }
    }

    pub fn is_configured_owner(&self, sender: &str) -> bool {
        self.owners.iter().any(|owner| same_user(owner, sender))
    }

    /// Build a fresh context; a missing roster grants no roster-based authority
    pub fn resolve(&self, sender: &str, bot_id: &str, roster: Option<&GroupRoster>) -> PermissionContext {
        let (sender_is_group_admin, sender_is_group_owner, bot_is_admin) = match roster {
            Some(roster) => (
                roster.is_admin(sender),
                roster.is_owner(sender),
                roster.is_admin(bot_id),
            ),
            None => (false, false, false),
        };

        PermissionContext {
            sender_is_bot_admin: same_user(sender, bot_id),
            sender_is_group_admin,
            sender_is_group_owner,
            sender_is_configured_owner: self.is_configured_owner(sender),
            bot_is_admin,
        }
    }

    /// Capability is checked before sender authority
    pub fn authorize(
        &self,
        spec: &CommandSpec,
        ctx: &PermissionContext,
        chat_id: &str,
        sender: &str,
    ) -> Result<(), GuardError> {
        if spec.requires_bot_admin && !ctx.bot_is_admin {
            return Err(GuardError::Capability {
                chat: chat_id.to_string(),
                action: spec.name.to_string(),
            });
        }
        if spec.requires_sender_auth && !ctx.sender_is_authorized() {
            debug!("{} denied {} in {}", sender, spec.name, chat_id);
            return Err(GuardError::PermissionDenied {
                sender: sender.to_string(),
                command: spec.name.to_string(),
            });
        }
        Ok(())
    }
}
