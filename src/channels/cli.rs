//! CLI channel: a stdin/stdout REPL for local testing.
//!
//! Every line is a private message from `local-user`, who is treated as a
//! home-server manager. Orders are printed instead of posted.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Author, Channel, IncomingMessage, MemberInfo, MessageStream, OutgoingResponse,
};
use crate::error::ChannelError;
use crate::relay::action::Reaction;
use crate::relay::order::ResolvedOrder;

const LOCAL_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Render an order the way it would appear in the output channel.
fn render_order(order: &ResolvedOrder) -> String {
    let mut out = format!("── {} ──\n", order.title);
    if !order.body.is_empty() {
        out.push_str(&order.body);
        out.push('\n');
    }
    out.push_str(&format!("   from {}", order.author.name));
    for file in &order.attachments {
        out.push_str(&format!("\n   📎 {} ({})", file.filename, file.url));
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();
            let mut seq: u64 = 0;

            // Print prompt
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        seq += 1;
                        let msg = IncomingMessage::new(
                            "cli",
                            Author::new(LOCAL_USER, LOCAL_USER),
                            &line,
                        )
                        .with_id(seq.to_string())
                        .with_conversation("stdin")
                        .private();
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn react(&self, _msg: &IncomingMessage, reaction: Reaction) -> Result<(), ChannelError> {
        eprintln!("{}", reaction.emoji());
        eprint!("> ");
        Ok(())
    }

    async fn post_order(&self, order: &ResolvedOrder) -> Result<(), ChannelError> {
        println!("\n{}\n", render_order(order));
        Ok(())
    }

    async fn member_info(&self, _user_id: &str) -> Result<Option<MemberInfo>, ChannelError> {
        Ok(Some(MemberInfo {
            nick: None,
            top_role: None,
            can_manage_defaults: true,
        }))
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Attachment;
    use crate::relay::order::OrderAuthor;

    #[test]
    fn renders_title_body_and_files() {
        let order = ResolvedOrder {
            affiliation: "Crimson Guard".into(),
            turn: Some(2),
            title: "*[Turn 2]* Order from Crimson Guard".into(),
            body: "Advance".into(),
            author: OrderAuthor {
                name: "Jane".into(),
                icon_url: None,
            },
            attachments: vec![Attachment {
                id: "1".into(),
                filename: "map.png".into(),
                url: "https://cdn.example/map.png".into(),
                content_type: None,
                size: 3,
            }],
        };
        let text = render_order(&order);
        assert!(text.starts_with("── *[Turn 2]* Order from Crimson Guard ──\nAdvance\n"));
        assert!(text.contains("from Jane"));
        assert!(text.contains("map.png (https://cdn.example/map.png)"));
    }

    #[tokio::test]
    async fn local_user_is_a_manager() {
        let member = CliChannel::new().member_info(LOCAL_USER).await.unwrap();
        assert!(member.is_some_and(|m| m.can_manage_defaults));
    }
}
