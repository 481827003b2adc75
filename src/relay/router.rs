//! Command router.
//!
//! Maps a parsed [`Command`] to the outbound actions it produces. The
//! router reads and writes the preference store but never talks to the
//! platform; the dispatcher does that.

use std::sync::Arc;

use crate::channels::{IncomingMessage, MemberInfo};
use crate::config::CommandPrefixes;
use crate::error::{DatabaseError, MembershipError};
use crate::relay::action::{OutboundAction, Reaction};
use crate::relay::command::{Command, CommandParser};
use crate::relay::{affiliation, order, turn};
use crate::store::PreferenceStore;

/// Per-message view handed to the command handlers.
pub struct MessageContext<'a> {
    pub store: &'a dyn PreferenceStore,
    pub message: &'a IncomingMessage,
    /// Home-server membership. `None` when the sender is not a member or
    /// the lookup was skipped.
    pub member: Option<&'a MemberInfo>,
}

impl<'a> MessageContext<'a> {
    pub fn new(
        store: &'a dyn PreferenceStore,
        message: &'a IncomingMessage,
        member: Option<&'a MemberInfo>,
    ) -> Self {
        Self {
            store,
            message,
            member,
        }
    }

    pub fn sender_id(&self) -> &'a str {
        &self.message.author.id
    }

    /// Account name. Last resort for the affiliation.
    pub fn identity(&self) -> &'a str {
        &self.message.author.username
    }

    /// Server nickname, then profile display name, then account name.
    pub fn display_name(&self) -> &'a str {
        self.member
            .and_then(|m| m.nick.as_deref())
            .or(self.message.author.global_name.as_deref())
            .unwrap_or(&self.message.author.username)
    }

    pub fn platform_role(&self) -> Option<&'a str> {
        self.member.and_then(|m| m.top_role.as_deref())
    }

    pub fn can_manage_defaults(&self) -> bool {
        self.member.is_some_and(|m| m.can_manage_defaults)
    }
}

/// Router behaviour that comes from configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    pub prefixes: CommandPrefixes,
    /// Emit a log row for every relayed order.
    pub log_orders: bool,
}

pub struct Router {
    store: Arc<dyn PreferenceStore>,
    parser: CommandParser,
    log_orders: bool,
}

impl Router {
    pub fn new(store: Arc<dyn PreferenceStore>, settings: RouterSettings) -> Self {
        Self {
            store,
            parser: CommandParser::new(settings.prefixes),
            log_orders: settings.log_orders,
        }
    }

    pub fn parse(&self, message: &IncomingMessage) -> Command {
        self.parser.parse(&message.content, message.is_private)
    }

    /// Produce the actions for `command`.
    ///
    /// `member` must be the sender's home-server membership for any command
    /// where [`Command::requires_membership`] holds; `None` rejects it.
    pub async fn route(
        &self,
        message: &IncomingMessage,
        command: &Command,
        member: Option<&MemberInfo>,
    ) -> Result<Vec<OutboundAction>, DatabaseError> {
        if command.requires_membership() && member.is_none() {
            let err = MembershipError::NotMember {
                user_id: message.author.id.clone(),
            };
            tracing::info!(user_id = %message.author.id, "Rejected non-member");
            return Ok(vec![OutboundAction::Reply(err.to_string())]);
        }

        let ctx = MessageContext::new(self.store.as_ref(), message, member);
        match command {
            Command::Order => {
                order::compose(&ctx, &self.parser.prefixes().order, self.log_orders).await
            }
            Command::TurnSet(n) => turn::set(&ctx, *n).await,
            Command::TurnClear => turn::clear(&ctx).await,
            Command::TurnCheck => turn::check(&ctx).await,
            Command::TurnDefaultSet(n) => turn::set_default(&ctx, *n).await,
            Command::TurnDefaultClear => turn::clear_default(&ctx).await,
            Command::AffilSet(name) => affiliation::set(&ctx, name).await,
            Command::AffilClear => affiliation::clear(&ctx).await,
            Command::AffilCheck => affiliation::check(&ctx).await,
            Command::Help => Ok(vec![OutboundAction::Reply(self.help_text())]),
            Command::Invalid(err) => Ok(vec![
                OutboundAction::Reply(err.to_string()),
                OutboundAction::React(Reaction::Rejected),
            ]),
            Command::Unrecognized => Ok(Vec::new()),
        }
    }

    /// Usage text, rendered with the configured prefixes.
    pub fn help_text(&self) -> String {
        let p = self.parser.prefixes();
        format!(
            "**Orders relay**\n\
             `{order} <text>` send an order. Start with `{order}[Name]` to file it under another affiliation. Several `{order}` in one message send several orders.\n\
             `{turn} <n>` set your turn. `{turn} check` shows it, `{turn} clear` removes it.\n\
             `{turn} default <n>` / `{turn} default clear` set the server-wide turn (server managers only).\n\
             `{affil} <name>` set your affiliation. `{affil} check` shows it, `{affil} clear` removes it.\n\
             `{help}` show this message.",
            order = p.order,
            turn = p.turn,
            affil = p.affil,
            help = p.help,
        )
    }
}
