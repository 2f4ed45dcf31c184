//! Chat platform side effects
//!
//! The platform connection itself lives outside the core. The dispatcher only
//! needs this narrow surface; actions reach the non-destructive half of it
//! through the runtime handle's helpers, never the deletion call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::MessageRef;
use crate::error::PlatformError;

/// Where an outgoing message goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SendTarget {
    Channel(String),
    Direct(String),
}

/// Embed severity, rendered as a leading status emote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn emote(&self) -> &'static str {
        match self {
            Severity::Success => ":white_check_mark:",
            Severity::Warning => ":warning:",
            Severity::Error => ":x:",
        }
    }
}

/// Rich message block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Embed {
    /// Title plus description, the description prefixed with the severity emote
    pub fn simple(
        title: Option<&str>,
        description: Option<&str>,
        severity: Option<Severity>,
    ) -> Self {
        let description = description.map(|text| match severity {
            Some(severity) => format!("{} {}", severity.emote(), text),
            None => text.to_string(),
        });
        Self {
            title: title.map(str::to_string),
            description,
            image: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }
}

/// Message sent by an action through the helpers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}

/// Side effects the engine and its helpers perform on the platform
#[async_trait]
pub trait Platform: Send + Sync {
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError>;

    async fn send_message(
        &self,
        target: &SendTarget,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError>;

    async fn add_roles(&self, guild: &str, user: &str, roles: &[String])
        -> Result<(), PlatformError>;

    async fn remove_roles(
        &self,
        guild: &str,
        user: &str,
        roles: &[String],
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_embed_prefixes_severity() {
        let embed = Embed::simple(Some("Slap"), Some("done"), Some(Severity::Success));
        assert_eq!(embed.title.as_deref(), Some("Slap"));
        assert_eq!(
            embed.description.as_deref(),
            Some(":white_check_mark: done")
        );

        let plain = Embed::simple(None, Some("hi"), None);
        assert_eq!(plain.description.as_deref(), Some("hi"));
        assert!(plain.title.is_none());
    }

    #[test]
    fn test_send_target_wire_shape() {
        let json = serde_json::to_value(SendTarget::Direct("u1".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "direct", "id": "u1"}));
    }
}
