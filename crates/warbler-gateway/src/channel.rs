//! Bridge wire frames and routing
//!
//! A bridge is a platform adapter connected over WebSocket. It forwards chat
//! events to the gateway as [`InboundFrame`]s and carries out the
//! [`OutboundFrame`]s the gateway sends back.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use warbler_core::{MessageContext, MessageRef, OutgoingMessage, PlatformError, SendTarget};

use crate::Result;

/// Unique bridge identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId(pub String);

impl BridgeId {
    pub fn new() -> Self {
        Self(format!("bridge:{}", Uuid::new_v4()))
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BridgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event sent by a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A chat message was posted
    Message(MessageContext),

    /// A member joined a guild
    MemberJoin { guild: String, user: String },

    /// The bridge failed to carry out an outbound frame
    Error { reason: String },
}

/// Side effect requested from a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    DeleteMessage {
        channel_id: String,
        message_id: String,
    },
    SendMessage {
        target: SendTarget,
        message: OutgoingMessage,
    },
    AddRoles {
        guild: String,
        user: String,
        roles: Vec<String>,
    },
    RemoveRoles {
        guild: String,
        user: String,
        roles: Vec<String>,
    },
}

impl OutboundFrame {
    pub fn delete(message: &MessageRef) -> Self {
        OutboundFrame::DeleteMessage {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
        }
    }
}

/// Serialized frame queued for a bridge's socket
pub type WireFrame = String;

/// A connected bridge
#[derive(Debug, Clone)]
pub struct Bridge {
    pub id: BridgeId,

    /// Sender for outgoing frames (JSON text)
    tx: mpsc::Sender<WireFrame>,

    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl Bridge {
    pub fn new(tx: mpsc::Sender<WireFrame>) -> Self {
        Self {
            id: BridgeId::new(),
            tx,
            connected_at: chrono::Utc::now(),
        }
    }

    /// Queue a frame for this bridge
    pub async fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.tx.send(json).await.map_err(|e| {
            crate::GatewayError::Bridge(format!("bridge {} is gone: {}", self.id, e))
        })
    }
}

/// Connected bridges, oldest first. Outbound frames go to the oldest one.
#[derive(Debug, Default)]
pub struct BridgeRouter {
    bridges: RwLock<Vec<Bridge>>,
}

impl BridgeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new bridge
    pub async fn register(&self, bridge: Bridge) {
        let id = bridge.id.clone();
        self.bridges.write().await.push(bridge);
        tracing::info!("Bridge registered: {}", id);
    }

    /// Unregister a bridge; false if it was not registered
    pub async fn unregister(&self, id: &BridgeId) -> bool {
        let mut bridges = self.bridges.write().await;
        let before = bridges.len();
        bridges.retain(|bridge| &bridge.id != id);
        let removed = bridges.len() < before;
        if removed {
            tracing::info!("Bridge unregistered: {}", id);
        }
        removed
    }

    pub async fn active_bridges(&self) -> Vec<BridgeId> {
        let bridges = self.bridges.read().await;
        bridges.iter().map(|bridge| bridge.id.clone()).collect()
    }

    pub async fn bridge_count(&self) -> usize {
        self.bridges.read().await.len()
    }

    /// Deliver a frame to the primary bridge
    pub async fn send(&self, frame: &OutboundFrame) -> std::result::Result<(), PlatformError> {
        let primary = self.bridges.read().await.first().cloned();
        let Some(bridge) = primary else {
            return Err(PlatformError::Disconnected);
        };
        bridge
            .send(frame)
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_message_wire_shape() {
        let frame: InboundFrame = serde_json::from_value(json!({
            "type": "message",
            "id": "m1",
            "content": "!slap bob",
            "author": {"id": "u1", "name": "alice", "roles": ["Member"]},
            "channel": {"id": "c1", "name": "general", "category": "Chat"},
            "guild": "g1"
        }))
        .unwrap();

        let InboundFrame::Message(context) = frame else {
            panic!("expected a message frame");
        };
        assert_eq!(context.content, "!slap bob");
        assert!(context.author.roles.contains("Member"));
        assert!(!context.author.bot);
        assert_eq!(context.channel.category.as_deref(), Some("Chat"));
    }

    #[test]
    fn test_outbound_wire_shape() {
        let frame = OutboundFrame::delete(&MessageRef {
            id: "m1".into(),
            channel_id: "c1".into(),
        });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "delete_message", "channel_id": "c1", "message_id": "m1"})
        );

        let join: InboundFrame =
            serde_json::from_str(r#"{"type":"member_join","guild":"g1","user":"u9"}"#).unwrap();
        assert_eq!(
            join,
            InboundFrame::MemberJoin {
                guild: "g1".into(),
                user: "u9".into()
            }
        );
    }

    #[tokio::test]
    async fn test_router_sends_to_oldest_bridge() {
        let router = BridgeRouter::new();
        assert_eq!(
            router.send(&OutboundFrame::delete(&MessageRef {
                id: "m1".into(),
                channel_id: "c1".into(),
            }))
            .await,
            Err(PlatformError::Disconnected)
        );

        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, mut second_rx) = mpsc::channel(4);
        let first = Bridge::new(first_tx);
        let first_id = first.id.clone();
        router.register(first).await;
        router.register(Bridge::new(second_tx)).await;
        assert_eq!(router.bridge_count().await, 2);

        let frame = OutboundFrame::AddRoles {
            guild: "g1".into(),
            user: "u1".into(),
            roles: vec!["Member".into()],
        };
        router.send(&frame).await.unwrap();
        assert!(first_rx.try_recv().unwrap().contains("add_roles"));
        assert!(second_rx.try_recv().is_err());

        assert!(router.unregister(&first_id).await);
        assert!(!router.unregister(&first_id).await);
        router.send(&frame).await.unwrap();
        assert!(second_rx.try_recv().is_ok());
    }
}
