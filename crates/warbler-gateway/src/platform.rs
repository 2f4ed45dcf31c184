//! Platform calls carried out by the connected bridge

use std::sync::Arc;

use async_trait::async_trait;
use warbler_core::{MessageRef, OutgoingMessage, Platform, PlatformError, SendTarget};

use crate::channel::{BridgeRouter, OutboundFrame};

/// [`Platform`] that forwards every call to the primary bridge as a frame.
///
/// Delivery is fire-and-forget: a call succeeds once the frame is queued,
/// and bridge-side failures come back as `error` frames that are only
/// logged.
#[derive(Debug, Clone)]
pub struct BridgePlatform {
    router: Arc<BridgeRouter>,
}

impl BridgePlatform {
    pub fn new(router: Arc<BridgeRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<BridgeRouter> {
        &self.router
    }
}

#[async_trait]
impl Platform for BridgePlatform {
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError> {
        self.router.send(&OutboundFrame::delete(message)).await
    }

    async fn send_message(
        &self,
        target: &SendTarget,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        self.router
            .send(&OutboundFrame::SendMessage {
                target: target.clone(),
                message: message.clone(),
            })
            .await
    }

    async fn add_roles(
        &self,
        guild: &str,
        user: &str,
        roles: &[String],
    ) -> Result<(), PlatformError> {
        self.router
            .send(&OutboundFrame::AddRoles {
                guild: guild.to_string(),
                user: user.to_string(),
                roles: roles.to_vec(),
            })
            .await
    }

    async fn remove_roles(
        &self,
        guild: &str,
        user: &str,
        roles: &[String],
    ) -> Result<(), PlatformError> {
        self.router
            .send(&OutboundFrame::RemoveRoles {
                guild: guild.to_string(),
                user: user.to_string(),
                roles: roles.to_vec(),
            })
            .await
    }
}
