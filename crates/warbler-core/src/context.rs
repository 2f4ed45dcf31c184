//! Inbound message context
//!
//! One `MessageContext` is built per inbound message and shared read-only by
//! every stage of the dispatch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Enough identity for the platform to act on the original message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub channel_id: String,
}

/// Message author
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Bot accounts never trigger commands
    #[serde(default)]
    pub bot: bool,

    /// Role names held by the author
    #[serde(default)]
    pub roles: HashSet<String>,
}

impl Author {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_bot(mut self) -> Self {
        self.bot = true;
        self
    }
}

/// Channel the message was posted in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub category: Option<String>,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A single inbound message event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    pub id: String,
    pub content: String,
    pub author: Author,
    pub channel: ChannelRef,

    #[serde(default)]
    pub guild: Option<String>,
}

impl MessageContext {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        author: Author,
        channel: ChannelRef,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author,
            channel,
            guild: None,
        }
    }

    pub fn in_guild(mut self, guild: impl Into<String>) -> Self {
        self.guild = Some(guild.into());
        self
    }

    /// Handle used by the deletion coordinator
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            id: self.id.clone(),
            channel_id: self.channel.id.clone(),
        }
    }
}
