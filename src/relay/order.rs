//! Order composer.
//!
//! Turns one `!sendorder` message into one [`ResolvedOrder`] per segment.
//! A message may hold several orders back to back; each one may open with
//! a `[Affiliation]` override that applies to that segment only.

use crate::channels::Attachment;
use crate::error::DatabaseError;
use crate::relay::action::{LogRow, OutboundAction, Reaction};
use crate::relay::affiliation::effective_affiliation;
use crate::relay::command::starts_with_order_prefix;
use crate::relay::router::MessageContext;
use crate::relay::turn::effective_turn;

/// One order segment after the prefix has been stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSubmission<'a> {
    /// Bracket override, trimmed. `None` for `[]` or no bracket at all.
    pub declared_affiliation: Option<&'a str>,
    pub body: &'a str,
}

/// Who an order is shown as coming from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

/// A fully resolved order, ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub affiliation: String,
    pub turn: Option<u32>,
    pub title: String,
    pub body: String,
    pub author: OrderAuthor,
    pub attachments: Vec<Attachment>,
}

impl ResolvedOrder {
    /// Build the log sink row for this order.
    pub fn log_row(&self, timestamp: impl Into<String>) -> LogRow {
        LogRow {
            timestamp: timestamp.into(),
            turn: self.turn,
            affiliation: self.affiliation.clone(),
            author_name: self.author.name.clone(),
            content: self.body.clone(),
            attachment_urls: self.attachments.iter().map(|a| a.url.clone()).collect(),
        }
    }
}

/// Parse the text that follows an order prefix.
///
/// The override is only recognised when `[` comes immediately after the
/// prefix. An unterminated bracket is treated as body text.
pub fn parse_submission(raw: &str) -> OrderSubmission<'_> {
    if let Some(inner) = raw.strip_prefix('[') {
        if let Some(end) = inner.find(']') {
            let declared = inner[..end].trim();
            return OrderSubmission {
                declared_affiliation: (!declared.is_empty()).then_some(declared),
                body: inner[end + 1..].trim(),
            };
        }
    }
    OrderSubmission {
        declared_affiliation: None,
        body: raw.trim(),
    }
}

/// Split `text` on order-prefix boundaries and return what follows each
/// prefix, untrimmed.
///
/// A boundary is the prefix at the start of the text or right after
/// whitespace, followed by whitespace, `[` or the end of the text. Text
/// before the first boundary is dropped.
pub fn split_segments<'a>(text: &'a str, prefix: &str) -> Vec<&'a str> {
    let text = text.trim_start();
    let mut starts = Vec::new();
    let mut prev_is_space = true;
    for (i, c) in text.char_indices() {
        if prev_is_space && starts_with_order_prefix(&text[i..], prefix) {
            starts.push(i);
        }
        prev_is_space = c.is_whitespace();
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(text.len());
            &text[start + prefix.len()..end]
        })
        .collect()
}

/// `Order from <affiliation>`, with an italic turn tag when a turn is known.
pub fn compose_title(affiliation: &str, turn: Option<u32>) -> String {
    match turn {
        Some(turn) => format!("*[Turn {turn}]* Order from {affiliation}"),
        None => format!("Order from {affiliation}"),
    }
}

/// Everything an order needs that does not depend on the segment. Read once
/// per message.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub stored_affiliation: Option<String>,
    pub platform_role: Option<String>,
    pub identity: String,
    pub turn: Option<u32>,
    pub author: OrderAuthor,
    pub attachments: Vec<Attachment>,
}

impl OrderContext {
    pub async fn load(ctx: &MessageContext<'_>) -> Result<Self, DatabaseError> {
        let stored_affiliation = ctx.store.get(ctx.sender_id()).await?.affiliation;
        let turn = effective_turn(ctx.store, ctx.sender_id())
            .await?
            .map(|(turn, _)| turn);

        Ok(Self {
            stored_affiliation,
            platform_role: ctx.platform_role().map(str::to_string),
            identity: ctx.identity().to_string(),
            turn,
            author: OrderAuthor {
                name: ctx.display_name().to_string(),
                icon_url: ctx.message.author.avatar_url.clone(),
            },
            attachments: ctx.message.attachments.clone(),
        })
    }

    pub fn resolve(&self, submission: &OrderSubmission<'_>) -> ResolvedOrder {
        let affiliation = effective_affiliation(
            submission.declared_affiliation,
            self.stored_affiliation.as_deref(),
            self.platform_role.as_deref(),
            &self.identity,
        );
        ResolvedOrder {
            title: compose_title(&affiliation, self.turn),
            affiliation,
            turn: self.turn,
            body: submission.body.to_string(),
            author: self.author.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Timestamp for log rows, in the host's locale format.
pub fn log_timestamp() -> String {
    chrono::Local::now().format("%c").to_string()
}

/// Compose every order in the message into outbound actions.
///
/// Each segment yields a post followed by a delivered reaction and, when
/// `log_orders` is set, a log row.
pub async fn compose(
    ctx: &MessageContext<'_>,
    prefix: &str,
    log_orders: bool,
) -> Result<Vec<OutboundAction>, DatabaseError> {
    let order_ctx = OrderContext::load(ctx).await?;
    let segments = split_segments(&ctx.message.content, prefix);
    let timestamp = log_timestamp();

    tracing::info!(
        user_id = ctx.sender_id(),
        segments = segments.len(),
        "Composing orders"
    );

    let mut actions = Vec::with_capacity(segments.len() * 3);
    for raw in segments {
        let order = order_ctx.resolve(&parse_submission(raw));
        let row = log_orders.then(|| order.log_row(timestamp.clone()));
        actions.push(OutboundAction::PostOrder(order));
        actions.push(OutboundAction::React(Reaction::Delivered));
        if let Some(row) = row {
            actions.push(OutboundAction::AppendLog(row));
        }
    }
    Ok(actions)
}
