//! Warbler Gateway - Platform bridge and bot assembly
//!
//! This crate hosts the parts of a Warbler bot that sit around the dispatch
//! engine: the WebSocket gateway platform adapters connect to, and the
//! concrete capability surfaces actions reach through their runtime handle.
//!
//! # Architecture
//!
//! ```text
//!   platform adapter (bridge)
//!          │   ▲
//!  inbound │   │ outbound frames
//!   frames ▼   │
//!   ┌──────────────────┐      ┌────────────────────┐
//!   │     Gateway      │─────▶│     Dispatcher     │
//!   │  /ws /health     │      │  (warbler-core)    │
//!   │  /status         │      └─────────┬──────────┘
//!   └────────┬─────────┘                │ actions
//!            │                ┌─────────▼──────────┐
//!   ┌────────▼─────────┐      │   RuntimeHandle    │
//!   │  BridgeRouter    │◀─────│ helpers · assets   │
//!   │  BridgePlatform  │      │ persistence · store│
//!   └──────────────────┘      └────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Bridge protocol**: JSON frames tagged by `type`, optional bearer auth
//! - **Assets**: read-only asset tree plus a writable store, by logical path
//! - **Persistence**: SQLite documents keyed by collection and key
//! - **Configuration**: one YAML file for the whole bot

pub mod assets;
pub mod bot;
pub mod channel;
pub mod config;
pub mod error;
pub mod gateway;
pub mod helpers;
pub mod persistence;
pub mod platform;

pub use assets::FsAssetStore;
pub use bot::Bot;
pub use channel::{Bridge, BridgeId, BridgeRouter, InboundFrame, OutboundFrame};
pub use config::{BotConfig, DEFAULT_CONFIG_PATH};
pub use error::{GatewayError, Result};
pub use gateway::{BridgeClient, BridgeConnection, Gateway, GatewayState};
pub use helpers::PlatformHelpers;
pub use persistence::DocumentStore;
pub use platform::BridgePlatform;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default WebSocket port
pub const DEFAULT_PORT: u16 = 18790;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
