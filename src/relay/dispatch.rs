//! Action dispatcher.
//!
//! Executes the router's actions in order against the platform channel and
//! the order log. Nothing here is retried. A failed order post suppresses
//! the reaction and log row that belong to it.

use std::sync::Arc;

use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::relay::action::OutboundAction;
use crate::sheets::OrderLog;

/// What happened to the orders in one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    log: Option<Arc<dyn OrderLog>>,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>, log: Option<Arc<dyn OrderLog>>) -> Self {
        Self { channel, log }
    }

    /// Run `actions` for `msg`.
    pub async fn execute(&self, msg: &IncomingMessage, actions: Vec<OutboundAction>) -> DispatchReport {
        let mut report = DispatchReport::default();
        // Set after a failed post, cleared by the next one.
        let mut skipping = false;

        for action in actions {
            match action {
                OutboundAction::Reply(text) => {
                    if let Err(e) = self.channel.respond(msg, OutgoingResponse::text(text)).await {
                        tracing::warn!(channel = self.channel.name(), "Reply failed: {e}");
                    }
                }
                OutboundAction::React(reaction) => {
                    if skipping {
                        continue;
                    }
                    if let Err(e) = self.channel.react(msg, reaction).await {
                        tracing::warn!(channel = self.channel.name(), ?reaction, "Reaction failed: {e}");
                    }
                }
                OutboundAction::PostOrder(order) => {
                    if order.body.is_empty() {
                        tracing::warn!(
                            user_id = %msg.author.id,
                            affiliation = %order.affiliation,
                            "Relaying order with empty body"
                        );
                    }
                    match self.channel.post_order(&order).await {
                        Ok(()) => {
                            skipping = false;
                            report.delivered += 1;
                        }
                        Err(e) => {
                            tracing::warn!(
                                channel = self.channel.name(),
                                user_id = %msg.author.id,
                                "Order delivery failed: {e}"
                            );
                            skipping = true;
                            report.failed += 1;
                        }
                    }
                }
                OutboundAction::AppendLog(row) => {
                    if skipping {
                        continue;
                    }
                    let Some(log) = &self.log else {
                        tracing::debug!("No order log configured, dropping row");
                        continue;
                    };
                    if let Err(e) = log.append(&row).await {
                        tracing::warn!(user_id = %msg.author.id, "Order log append failed: {e}");
                    }
                }
            }
        }

        if report.failed > 0 {
            let notice = failure_notice(report);
            if let Err(e) = self.channel.respond(msg, OutgoingResponse::text(notice)).await {
                tracing::warn!(channel = self.channel.name(), "Failure notice not sent: {e}");
            }
        }

        report
    }
}

fn failure_notice(report: DispatchReport) -> String {
    if report.delivered == 0 && report.failed == 1 {
        "Your order could not be delivered. Please try again.".to_string()
    } else {
        format!(
            "{} of {} orders could not be delivered. Please resend those.",
            report.failed,
            report.delivered + report.failed
        )
    }
}
