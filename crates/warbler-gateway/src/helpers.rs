//! Helper surface backed by the platform bridge

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use warbler_core::{
    Author, CapabilityError, Helpers, MessageContext, OutgoingMessage, Platform, PlatformError,
    SendTarget,
};

use crate::config::AdminSettings;

#[derive(Clone)]
pub struct PlatformHelpers {
    platform: Arc<dyn Platform>,
    owner: Option<String>,
    admins: HashSet<String>,
}

impl PlatformHelpers {
    pub fn new(platform: Arc<dyn Platform>, admin: &AdminSettings) -> Self {
        Self {
            platform,
            owner: admin.owner.clone(),
            admins: admin.admins.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for PlatformHelpers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformHelpers")
            .field("owner", &self.owner)
            .field("admins", &self.admins)
            .finish_non_exhaustive()
    }
}

fn guild_of(context: &MessageContext) -> Result<&str, CapabilityError> {
    context.guild.as_deref().ok_or_else(|| {
        CapabilityError::Platform(PlatformError::Rejected(format!(
            "message {} was not sent in a guild",
            context.id
        )))
    })
}

#[async_trait]
impl Helpers for PlatformHelpers {
    fn is_admin(&self, author: &Author) -> bool {
        self.owner.as_deref() == Some(author.id.as_str()) || self.admins.contains(&author.id)
    }

    async fn send_message(
        &self,
        context: &MessageContext,
        message: OutgoingMessage,
        as_dm: bool,
    ) -> Result<(), CapabilityError> {
        let target = if as_dm {
            SendTarget::Direct(context.author.id.clone())
        } else {
            SendTarget::Channel(context.channel.id.clone())
        };
        Ok(self.platform.send_message(&target, &message).await?)
    }

    async fn give_role(
        &self,
        context: &MessageContext,
        user: &str,
        role: &str,
    ) -> Result<(), CapabilityError> {
        let guild = guild_of(context)?;
        Ok(self
            .platform
            .add_roles(guild, user, &[role.to_string()])
            .await?)
    }

    async fn take_role(
        &self,
        context: &MessageContext,
        user: &str,
        role: &str,
    ) -> Result<(), CapabilityError> {
        let guild = guild_of(context)?;
        Ok(self
            .platform
            .remove_roles(guild, user, &[role.to_string()])
            .await?)
    }
}
