//! Discord channel. REST API v10 for output, the gateway for input.
//!
//! Orders go to the configured output channel as an embed. Attachments are
//! downloaded from the CDN and re-uploaded with the embed so they survive
//! the source message being deleted.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::discord_gateway;
use crate::channels::{Channel, IncomingMessage, MemberInfo, MessageStream, OutgoingResponse};
use crate::config::DiscordConfig;
use crate::error::ChannelError;
use crate::relay::action::Reaction;
use crate::relay::order::ResolvedOrder;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum content length for a Discord message.
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;
const EMBED_TITLE_LIMIT: usize = 256;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;
const EMBED_AUTHOR_LIMIT: usize = 256;

const PERMISSION_ADMINISTRATOR: u64 = 1 << 3;
const PERMISSION_MANAGE_GUILD: u64 = 1 << 5;

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GuildRole {
    id: String,
    name: String,
    position: i64,
    /// Bitfield, serialized as a decimal string.
    permissions: String,
}

#[derive(Debug, Deserialize)]
struct GatewayBot {
    url: String,
}

/// Discord channel backed by REST calls plus a gateway listener task.
pub struct DiscordChannel {
    token: SecretString,
    orders_channel_id: String,
    home_guild_id: String,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            token: config.token.clone(),
            orders_channel_id: config.orders_channel_id.clone(),
            home_guild_id: config.home_guild_id.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{DISCORD_API_BASE}{path}")
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: "discord".into(),
            reason: reason.into(),
        }
    }

    fn delivery_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::DeliveryFailed {
            name: "discord".into(),
            reason: reason.into(),
        }
    }

    fn lookup_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::LookupFailed {
            name: "discord".into(),
            reason: reason.into(),
        }
    }

    /// Send a text message, split to fit Discord's 2000 character limit.
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, DISCORD_MAX_MESSAGE_LENGTH) {
            let resp = self
                .client
                .post(self.api_url(&format!("/channels/{channel_id}/messages")))
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .json(&serde_json::json!({ "content": chunk }))
                .send()
                .await
                .map_err(|e| Self::send_failed(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(Self::send_failed(format!(
                    "create message returned {status}: {body}"
                )));
            }
        }
        Ok(())
    }

    /// Download an attachment from the CDN.
    async fn fetch_attachment(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("attachment download returned {}", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn guild_roles(&self) -> Result<Vec<GuildRole>, ChannelError> {
        let resp = self
            .client
            .get(self.api_url(&format!("/guilds/{}/roles", self.home_guild_id)))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| Self::lookup_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::lookup_failed(format!(
                "roles lookup returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| Self::lookup_failed(format!("roles parse error: {e}")))
    }

    async fn gateway_url(&self) -> Result<String, ChannelError> {
        let startup_failed = |reason: String| ChannelError::StartupFailed {
            name: "discord".into(),
            reason,
        };

        let resp = self
            .client
            .get(self.api_url("/gateway/bot"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| startup_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(startup_failed(format!(
                "gateway lookup returned {}",
                resp.status()
            )));
        }
        let gateway: GatewayBot = resp
            .json()
            .await
            .map_err(|e| startup_failed(format!("gateway parse error: {e}")))?;
        Ok(gateway.url)
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let gateway_url = self.gateway_url().await?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tracing::info!(url = %gateway_url, "Discord channel listening for messages...");
        tokio::spawn(discord_gateway::run(gateway_url, self.token.clone(), tx));

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        if msg.conversation_id.is_empty() {
            return Err(Self::send_failed("message has no channel id"));
        }
        self.send_message(&msg.conversation_id, &response.content)
            .await
    }

    async fn react(&self, msg: &IncomingMessage, reaction: Reaction) -> Result<(), ChannelError> {
        let url = reaction_url(&msg.conversation_id, &msg.id, reaction.emoji())
            .map_err(|e| Self::send_failed(e.to_string()))?;

        let resp = self
            .client
            .put(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::send_failed(format!(
                "add reaction returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn post_order(&self, order: &ResolvedOrder) -> Result<(), ChannelError> {
        let url = self.api_url(&format!("/channels/{}/messages", self.orders_channel_id));
        let payload = order_payload(order);

        let request = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header());

        let request = if order.attachments.is_empty() {
            request.json(&payload)
        } else {
            let mut form = Form::new().text("payload_json", payload.to_string());
            for (i, file) in order.attachments.iter().enumerate() {
                let bytes = self.fetch_attachment(&file.url).await.map_err(|e| {
                    Self::delivery_failed(format!("could not fetch {}: {e}", file.filename))
                })?;
                let mut part = Part::bytes(bytes).file_name(file.filename.clone());
                if let Some(mime) = &file.content_type {
                    part = part
                        .mime_str(mime)
                        .map_err(|e| Self::delivery_failed(e.to_string()))?;
                }
                form = form.part(format!("files[{i}]"), part);
            }
            request.multipart(form)
        };

        let resp = request
            .send()
            .await
            .map_err(|e| Self::delivery_failed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::delivery_failed(format!(
                "create message returned {status}: {body}"
            )));
        }

        tracing::info!(
            affiliation = %order.affiliation,
            files = order.attachments.len(),
            "Order relayed"
        );
        Ok(())
    }

    async fn member_info(&self, user_id: &str) -> Result<Option<MemberInfo>, ChannelError> {
        let resp = self
            .client
            .get(self.api_url(&format!(
                "/guilds/{}/members/{user_id}",
                self.home_guild_id
            )))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| Self::lookup_failed(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::lookup_failed(format!(
                "member lookup returned {}",
                resp.status()
            )));
        }

        let member: GuildMember = resp
            .json()
            .await
            .map_err(|e| Self::lookup_failed(format!("member parse error: {e}")))?;
        let roles = self.guild_roles().await?;
        Ok(Some(summarize_member(&member, &roles, &self.home_guild_id)))
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("/users/@me"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "discord".into(),
                reason: format!("/users/@me returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Discord channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Reaction endpoint with the emoji percent-encoded as a path segment.
fn reaction_url(channel_id: &str, message_id: &str, emoji: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(DISCORD_API_BASE)?;
    url.path_segments_mut()
        .map_err(|()| anyhow::anyhow!("api base cannot hold a path"))?
        .extend(["channels", channel_id, "messages", message_id, "reactions", emoji, "@me"]);
    Ok(url)
}

/// Embed body for an order. Attachment stubs are added when files ride along.
fn order_payload(order: &ResolvedOrder) -> serde_json::Value {
    let mut author = serde_json::json!({ "name": truncate(&order.author.name, EMBED_AUTHOR_LIMIT) });
    if let Some(icon) = &order.author.icon_url {
        author["icon_url"] = serde_json::Value::String(icon.clone());
    }

    let mut embed = serde_json::json!({
        "title": truncate(&order.title, EMBED_TITLE_LIMIT),
        "author": author,
    });
    if !order.body.is_empty() {
        embed["description"] =
            serde_json::Value::String(truncate(&order.body, EMBED_DESCRIPTION_LIMIT).to_string());
    }

    let attachments: Vec<serde_json::Value> = order
        .attachments
        .iter()
        .enumerate()
        .map(|(i, file)| serde_json::json!({ "id": i, "filename": file.filename }))
        .collect();

    serde_json::json!({
        "embeds": [embed],
        "attachments": attachments,
    })
}

/// Reduce guild member + role data to what the relay needs.
///
/// The top role is the highest-positioned role the member holds, ignoring
/// the implicit everyone role (whose id equals the guild id). Permissions
/// are the union of the everyone role and the member's roles.
fn summarize_member(member: &GuildMember, roles: &[GuildRole], guild_id: &str) -> MemberInfo {
    let held: Vec<&GuildRole> = roles
        .iter()
        .filter(|r| r.id == guild_id || member.roles.contains(&r.id))
        .collect();

    let permissions = held
        .iter()
        .filter_map(|r| r.permissions.parse::<u64>().ok())
        .fold(0u64, |acc, p| acc | p);

    let top_role = held
        .iter()
        .filter(|r| r.id != guild_id)
        .max_by_key(|r| r.position)
        .map(|r| r.name.clone());

    MemberInfo {
        nick: member.nick.clone(),
        top_role,
        can_manage_defaults: permissions & (PERMISSION_ADMINISTRATOR | PERMISSION_MANAGE_GUILD)
            != 0,
    }
}

/// Cut `text` to at most `max` characters.
fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Split a message into chunks that fit Discord's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Find a good split point
        let chunk = truncate(remaining, max_len);
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(chunk.len());

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { chunk.len() } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Attachment;
    use crate::relay::order::OrderAuthor;

    fn role(id: &str, name: &str, position: i64, permissions: u64) -> GuildRole {
        GuildRole {
            id: id.into(),
            name: name.into(),
            position,
            permissions: permissions.to_string(),
        }
    }

    fn member(roles: &[&str]) -> GuildMember {
        GuildMember {
            nick: Some("Captain".into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn order(attachments: Vec<Attachment>, body: &str) -> ResolvedOrder {
        ResolvedOrder {
            affiliation: "Crimson Guard".into(),
            turn: Some(4),
            title: "*[Turn 4]* Order from Crimson Guard".into(),
            body: body.into(),
            author: OrderAuthor {
                name: "Jane".into(),
                icon_url: Some("https://cdn.discordapp.com/avatars/42/abc.png".into()),
            },
            attachments,
        }
    }

    #[test]
    fn discord_channel_name() {
        let ch = DiscordChannel::new(&DiscordConfig {
            token: SecretString::from("t"),
            orders_channel_id: "1".into(),
            home_guild_id: "2".into(),
        });
        assert_eq!(ch.name(), "discord");
        assert_eq!(ch.api_url("/gateway/bot"), "https://discord.com/api/v10/gateway/bot");
        assert_eq!(ch.auth_header(), "Bot t");
    }

    // ── Member summary ──────────────────────────────────────────────

    #[test]
    fn top_role_is_highest_position() {
        let roles = vec![
            role("g", "@everyone", 0, 0),
            role("r1", "Soldiers", 1, 0),
            role("r2", "Knights", 5, 0),
            role("r3", "Unheld", 9, 0),
        ];
        let info = summarize_member(&member(&["r1", "r2"]), &roles, "g");
        assert_eq!(info.top_role.as_deref(), Some("Knights"));
        assert_eq!(info.nick.as_deref(), Some("Captain"));
        assert!(!info.can_manage_defaults);
    }

    #[test]
    fn everyone_role_is_never_top() {
        let roles = vec![role("g", "@everyone", 0, 0)];
        let info = summarize_member(&member(&[]), &roles, "g");
        assert_eq!(info.top_role, None);
    }

    #[test]
    fn manage_guild_or_admin_grants_defaults() {
        let roles = vec![
            role("g", "@everyone", 0, 0),
            role("mods", "Mods", 2, PERMISSION_MANAGE_GUILD),
            role("admins", "Admins", 3, PERMISSION_ADMINISTRATOR),
        ];
        assert!(summarize_member(&member(&["mods"]), &roles, "g").can_manage_defaults);
        assert!(summarize_member(&member(&["admins"]), &roles, "g").can_manage_defaults);
    }

    #[test]
    fn everyone_permissions_apply() {
        let roles = vec![role("g", "@everyone", 0, PERMISSION_MANAGE_GUILD)];
        assert!(summarize_member(&member(&[]), &roles, "g").can_manage_defaults);
    }

    // ── Payloads ────────────────────────────────────────────────────

    #[test]
    fn order_payload_embed_fields() {
        let payload = order_payload(&order(vec![], "Advance north"));
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "*[Turn 4]* Order from Crimson Guard");
        assert_eq!(embed["description"], "Advance north");
        assert_eq!(embed["author"]["name"], "Jane");
        assert_eq!(
            embed["author"]["icon_url"],
            "https://cdn.discordapp.com/avatars/42/abc.png"
        );
        assert_eq!(payload["attachments"], serde_json::json!([]));
    }

    #[test]
    fn order_payload_omits_empty_description() {
        let payload = order_payload(&order(vec![], ""));
        assert!(payload["embeds"][0].get("description").is_none());
    }

    #[test]
    fn order_payload_lists_attachments() {
        let files = vec![
            Attachment {
                id: "a".into(),
                filename: "map.png".into(),
                url: "https://cdn/map.png".into(),
                content_type: Some("image/png".into()),
                size: 1,
            },
            Attachment {
                id: "b".into(),
                filename: "notes.txt".into(),
                url: "https://cdn/notes.txt".into(),
                content_type: None,
                size: 1,
            },
        ];
        let payload = order_payload(&order(files, "x"));
        assert_eq!(
            payload["attachments"],
            serde_json::json!([
                { "id": 0, "filename": "map.png" },
                { "id": 1, "filename": "notes.txt" }
            ])
        );
    }

    #[test]
    fn long_title_is_truncated() {
        let mut o = order(vec![], "x");
        o.title = "t".repeat(300);
        let payload = order_payload(&o);
        assert_eq!(payload["embeds"][0]["title"].as_str().unwrap().len(), 256);
    }

    #[test]
    fn reaction_url_encodes_emoji() {
        let url = reaction_url("c1", "m1", "👍").unwrap();
        assert_eq!(
            url.as_str(),
            "https://discord.com/api/v10/channels/c1/messages/m1/reactions/%F0%9F%91%8D/@me"
        );
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 2000), vec!["Hello"]);
    }

    #[test]
    fn split_message_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(1500), "b".repeat(1000));
        let chunks = split_message(&msg, 2000);
        assert_eq!(chunks, vec!["a".repeat(1500), "b".repeat(1000)]);
    }

    #[test]
    fn split_message_hard_cut() {
        let chunks = split_message(&"a".repeat(2500), 2000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2000);
        assert_eq!(chunks[1].len(), 500);
    }

    #[test]
    fn split_message_counts_characters_not_bytes() {
        let msg = "é".repeat(2000);
        assert_eq!(split_message(&msg, 2000).len(), 1);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
