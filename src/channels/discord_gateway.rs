//! Discord gateway listener.
//!
//! Keeps one websocket session open: hello, identify, heartbeat, and
//! `MESSAGE_CREATE` dispatches turned into [`IncomingMessage`]s. Any
//! reconnect starts a fresh session with a new identify.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::channels::{Attachment, Author, IncomingMessage};

/// GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const GATEWAY_INTENTS: u64 = (1 << 9) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const DEFAULT_AVATAR_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordAttachment {
    id: String,
    filename: String,
    url: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: DiscordUser,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
}

/// Avatar image for a user, falling back to Discord's stock avatar.
fn avatar_url(user: &DiscordUser) -> String {
    match &user.avatar {
        Some(hash) => format!("https://cdn.discordapp.com/avatars/{}/{hash}.png", user.id),
        None => DEFAULT_AVATAR_URL.to_string(),
    }
}

/// Convert a `MESSAGE_CREATE` payload. Bot authors yield `None`.
fn to_incoming(event: MessageCreate) -> Option<IncomingMessage> {
    if event.author.bot {
        return None;
    }

    let mut author = Author::new(&event.author.id, &event.author.username)
        .with_avatar_url(avatar_url(&event.author));
    if let Some(name) = &event.author.global_name {
        author = author.with_global_name(name);
    }

    let attachments = event
        .attachments
        .into_iter()
        .map(|a| Attachment {
            id: a.id,
            filename: a.filename,
            url: a.url,
            content_type: a.content_type,
            size: a.size,
        })
        .collect();

    let mut msg = IncomingMessage::new("discord", author, &event.content)
        .with_id(event.id)
        .with_conversation(event.channel_id)
        .with_attachments(attachments);
    if event.guild_id.is_none() {
        msg = msg.private();
    }
    Some(msg)
}

fn identify_payload(token: &SecretString) -> serde_json::Value {
    serde_json::json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token.expose_secret(),
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "orders-relay",
                "device": "orders-relay",
            },
        },
    })
}

fn heartbeat_payload(seq: Option<u64>) -> serde_json::Value {
    serde_json::json!({ "op": OP_HEARTBEAT, "d": seq })
}

/// Close codes after which reconnecting cannot help.
fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010..=4014)
}

// ── Session loop ────────────────────────────────────────────────────

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Open a new session.
    Reconnect,
    /// The consumer went away.
    Closed,
    /// Credentials or intents were rejected.
    Fatal(String),
}

/// Run gateway sessions until the receiver is dropped or Discord rejects
/// the bot outright.
pub(crate) async fn run(gateway_url: String, token: SecretString, tx: UnboundedSender<IncomingMessage>) {
    loop {
        match run_session(&gateway_url, &token, &tx).await {
            Ok(SessionEnd::Closed) => {
                tracing::info!("Discord listener channel closed");
                return;
            }
            Ok(SessionEnd::Fatal(reason)) => {
                tracing::error!("Discord gateway rejected the bot: {reason}");
                return;
            }
            Ok(SessionEnd::Reconnect) => {
                tracing::info!("Discord gateway reconnecting");
            }
            Err(e) => {
                tracing::warn!("Discord gateway error: {e}");
            }
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_session(
    gateway_url: &str,
    token: &SecretString,
    tx: &UnboundedSender<IncomingMessage>,
) -> anyhow::Result<SessionEnd> {
    let url = format!("{gateway_url}/?v=10&encoding=json");
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();

    // The first frame is always HELLO.
    let hello = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
                if payload.op == OP_HELLO {
                    break serde_json::from_value::<Hello>(payload.d)?;
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(SessionEnd::Reconnect),
        }
    };

    write
        .send(Message::Text(identify_payload(token).to_string().into()))
        .await?;

    let period = Duration::from_millis(hello.heartbeat_interval);
    let jitter = period.mul_f64(rand::random::<f64>());
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + jitter, period);
    let mut seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                write
                    .send(Message::Text(heartbeat_payload(seq).to_string().into()))
                    .await?;
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => return Ok(close_outcome(frame)),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Reconnect),
                };

                let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("Discord gateway sent unparseable payload: {e}");
                        continue;
                    }
                };
                if payload.s.is_some() {
                    seq = payload.s;
                }

                match payload.op {
                    OP_DISPATCH => {
                        if handle_dispatch(payload, tx).is_err() {
                            return Ok(SessionEnd::Closed);
                        }
                    }
                    OP_HEARTBEAT => {
                        write
                            .send(Message::Text(heartbeat_payload(seq).to_string().into()))
                            .await?;
                    }
                    OP_RECONNECT | OP_INVALID_SESSION => return Ok(SessionEnd::Reconnect),
                    OP_HEARTBEAT_ACK => {}
                    other => tracing::debug!(op = other, "Ignoring gateway opcode"),
                }
            }
        }
    }
}

fn close_outcome(frame: Option<CloseFrame>) -> SessionEnd {
    match frame {
        Some(frame) if is_fatal_close(u16::from(frame.code)) => {
            SessionEnd::Fatal(format!("close code {}: {}", u16::from(frame.code), frame.reason.as_str()))
        }
        _ => SessionEnd::Reconnect,
    }
}

/// Forward a dispatch event. `Err` means the receiver is gone.
fn handle_dispatch(payload: GatewayPayload, tx: &UnboundedSender<IncomingMessage>) -> Result<(), ()> {
    match payload.t.as_deref() {
        Some("READY") => {
            let user = payload
                .d
                .get("user")
                .and_then(|u| u.get("username"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            tracing::info!(user, "Discord gateway ready");
        }
        Some("MESSAGE_CREATE") => match serde_json::from_value::<MessageCreate>(payload.d) {
            Ok(event) => {
                if let Some(msg) = to_incoming(event) {
                    tx.send(msg).map_err(|_| ())?;
                }
            }
            Err(e) => tracing::warn!("Discord MESSAGE_CREATE parse error: {e}"),
        },
        _ => {}
    }
    Ok(())
}
