//! Channel trait and the platform-neutral message types it carries.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::relay::action::Reaction;
use crate::relay::order::ResolvedOrder;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// The sender of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Platform user id (the preference store key).
    pub id: String,
    /// Account name, used as the last-resort affiliation.
    pub username: String,
    /// Profile-level display name, if the platform has one.
    pub global_name: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            global_name: None,
            avatar_url: None,
        }
    }

    pub fn with_global_name(mut self, name: impl Into<String>) -> Self {
        self.global_name = Some(name.into());
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub content_type: Option<String>,
    pub size: u64,
}

/// An inbound message from any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Message id on the platform.
    pub id: String,
    /// Name of the channel adapter that produced it ("discord", "cli").
    pub channel: String,
    /// Platform conversation the message arrived in. Replies go here.
    pub conversation_id: String,
    pub author: Author,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Direct/private conversation with the bot.
    pub is_private: bool,
}

impl IncomingMessage {
    pub fn new(channel: &str, author: Author, content: &str) -> Self {
        Self {
            id: String::new(),
            channel: channel.to_string(),
            conversation_id: String::new(),
            author,
            content: content.to_string(),
            attachments: Vec::new(),
            is_private: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

/// What the platform knows about a home-server member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberInfo {
    /// Server-specific nickname.
    pub nick: Option<String>,
    /// Name of the member's highest role, excluding the implicit everyone role.
    pub top_role: Option<String>,
    /// Member may change server-wide defaults.
    pub can_manage_defaults: bool,
}

/// Plain-text reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A messaging platform the relay can listen on and post to.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Adapter name, used in logs.
    fn name(&self) -> &str;

    /// Start listening. Messages from bots (including ourselves) are filtered out.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply in the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Add a reaction to `msg`.
    async fn react(&self, msg: &IncomingMessage, reaction: Reaction) -> Result<(), ChannelError>;

    /// Post a resolved order, with its attachments, to the output channel.
    async fn post_order(&self, order: &ResolvedOrder) -> Result<(), ChannelError>;

    /// Look a user up in the home server. `None` means not a member.
    async fn member_info(&self, user_id: &str) -> Result<Option<MemberInfo>, ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
