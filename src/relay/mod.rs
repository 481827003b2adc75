//! The relay: command parsing, preference resolution, order composition,
//! and the loop that ties them to a channel.

pub mod action;
pub mod affiliation;
pub mod command;
pub mod dispatch;
pub mod order;
pub mod router;
pub mod turn;

use std::sync::Arc;

use futures::StreamExt;

pub use action::{LogRow, OutboundAction, Reaction};
pub use command::{Command, CommandParser};
pub use dispatch::{DispatchReport, Dispatcher};
pub use order::{OrderAuthor, ResolvedOrder};
pub use router::{MessageContext, Router, RouterSettings};

use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::error::Error;

const GENERIC_ERROR_REPLY: &str = "Something went wrong handling that. Please try again.";

/// Pulls messages from a channel and handles them one at a time.
pub struct Relay {
    channel: Arc<dyn Channel>,
    router: Router,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(channel: Arc<dyn Channel>, router: Router, dispatcher: Dispatcher) -> Self {
        Self {
            channel,
            router,
            dispatcher,
        }
    }

    /// Run until Ctrl+C or until the channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        let mut messages = self.channel.start().await?;
        tracing::info!(channel = self.channel.name(), "Relay ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("Channel stream ended, shutting down...");
                        break;
                    }
                },
            };

            self.handle_message(&message).await;
        }

        self.channel.shutdown().await?;
        Ok(())
    }

    /// Handle a single inbound message end to end.
    pub async fn handle_message(&self, message: &IncomingMessage) -> DispatchReport {
        let command = self.router.parse(message);
        if command == Command::Unrecognized {
            return DispatchReport::default();
        }

        tracing::debug!(
            user_id = %message.author.id,
            channel = %message.channel,
            ?command,
            "Handling message"
        );

        let member = if command.requires_membership() {
            match self.channel.member_info(&message.author.id).await {
                Ok(member) => member,
                Err(e) => {
                    tracing::warn!(user_id = %message.author.id, "Member lookup failed: {e}");
                    self.reply_generic_error(message).await;
                    return DispatchReport::default();
                }
            }
        } else {
            None
        };

        match self.router.route(message, &command, member.as_ref()).await {
            Ok(actions) => self.dispatcher.execute(message, actions).await,
            Err(e) => {
                tracing::error!(user_id = %message.author.id, "Error handling message: {e}");
                self.reply_generic_error(message).await;
                DispatchReport::default()
            }
        }
    }

    async fn reply_generic_error(&self, message: &IncomingMessage) {
        if let Err(e) = self
            .channel
            .respond(message, OutgoingResponse::text(GENERIC_ERROR_REPLY))
            .await
        {
            tracing::warn!(channel = self.channel.name(), "Error reply not sent: {e}");
        }
    }
}
