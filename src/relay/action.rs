//! Outbound actions produced by the router and executed by the dispatcher.

use serde::Serialize;

use crate::relay::order::ResolvedOrder;

/// Acknowledgement signals, rendered as emoji reactions on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    /// An order was relayed.
    Delivered,
    /// A preference was stored for the first time, or cleared.
    Confirmed,
    /// An existing preference was overwritten.
    Updated,
    /// Input was malformed; nothing changed.
    Rejected,
    /// The sender lacks permission for the command.
    Unauthorized,
}

impl Reaction {
    pub fn emoji(self) -> &'static str {
        match self {
            Reaction::Delivered => "👍",
            Reaction::Confirmed => "✅",
            Reaction::Updated => "🔄",
            Reaction::Rejected => "❌",
            Reaction::Unauthorized => "⛔",
        }
    }
}

/// One row for the order log sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRow {
    pub timestamp: String,
    pub turn: Option<u32>,
    pub affiliation: String,
    pub author_name: String,
    pub content: String,
    pub attachment_urls: Vec<String>,
}

impl LogRow {
    /// Cells in sheet column order. Missing values become empty strings.
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.turn.map(|t| t.to_string()).unwrap_or_default(),
            self.affiliation.clone(),
            self.author_name.clone(),
            self.content.clone(),
            self.attachment_urls.join(" "),
        ]
    }
}

/// A side effect requested by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Plain-text reply in the conversation the message came from.
    Reply(String),
    /// Reaction on the inbound message.
    React(Reaction),
    /// Post an order to the output channel.
    PostOrder(ResolvedOrder),
    /// Append a row to the order log.
    AppendLog(LogRow),
}
