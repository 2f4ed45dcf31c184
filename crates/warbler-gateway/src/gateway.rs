//! Bridge gateway
//!
//! Platform bridges connect over WebSocket, stream chat events in and
//! receive side effects back. Every inbound message is dispatched on its
//! own task so a slow command never holds up the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, http::HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use warbler_core::{Dispatcher, MessageContext, Platform};

use crate::channel::{Bridge, BridgeId, BridgeRouter, InboundFrame, WireFrame};
use crate::platform::BridgePlatform;
use crate::{GatewayError, Result};

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub router: Arc<BridgeRouter>,
    pub platform: Arc<dyn Platform>,

    /// Roles given to every member that joins
    pub default_roles: Vec<String>,

    /// Bearer token bridges must present, if any
    pub auth_token: Option<String>,

    pub shutdown_tx: broadcast::Sender<()>,
}

impl GatewayState {
    pub fn new(dispatcher: Dispatcher, router: Arc<BridgeRouter>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            dispatcher,
            platform: Arc::new(BridgePlatform::new(router.clone())),
            router,
            default_roles: Vec::new(),
            auth_token: None,
            shutdown_tx,
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(token) = self.auth_token.as_deref() else {
            return true;
        };
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| presented == token)
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("dispatcher", &self.dispatcher)
            .field("default_roles", &self.default_roles)
            .field("auth", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Main Gateway
#[derive(Debug)]
pub struct Gateway {
    state: GatewayState,
}

impl Gateway {
    pub fn new(dispatcher: Dispatcher, router: Arc<BridgeRouter>) -> Self {
        Self {
            state: GatewayState::new(dispatcher, router),
        }
    }

    pub fn with_default_roles(mut self, roles: Vec<String>) -> Self {
        self.state.default_roles = roles;
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.state.auth_token = token;
        self
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/ws", get(Self::handle_ws_upgrade))
            .route("/health", get(Self::handle_health))
            .route("/status", get(Self::handle_status))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self.state.clone()))
    }

    /// Bind `addr` and serve until [`Gateway::shutdown`]
    pub async fn start(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until [`Gateway::shutdown`]
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        tracing::info!("Warbler gateway listening on {}", addr);

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }

    /// Shutdown the gateway
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
        tracing::info!("Gateway shutdown initiated");
    }

    // HTTP handlers

    async fn handle_health() -> impl IntoResponse {
        axum::Json(serde_json::json!({
            "status": "healthy",
            "version": crate::VERSION
        }))
    }

    async fn handle_status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
        let generation = state.dispatcher.store().current();

        axum::Json(serde_json::json!({
            "version": crate::VERSION,
            "generation": generation.number(),
            "loaded_at": generation.loaded_at().to_rfc3339(),
            "specs": generation.len(),
            "bridges": state.router.bridge_count().await,
        }))
    }

    async fn handle_ws_upgrade(
        ws: WebSocketUpgrade,
        headers: HeaderMap,
        State(state): State<Arc<GatewayState>>,
    ) -> Response {
        if !state.authorized(&headers) {
            tracing::warn!("Rejected bridge connection: bad or missing bearer token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        ws.on_upgrade(move |socket| Self::handle_ws_connection(socket, state))
    }

    async fn handle_ws_connection(socket: WebSocket, state: Arc<GatewayState>) {
        let (mut tx, mut rx) = socket.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<WireFrame>(100);

        let bridge = Bridge::new(outgoing_tx);
        let bridge_id = bridge.id.clone();
        state.router.register(bridge).await;

        let outgoing_id = bridge_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if tx.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            tracing::debug!("Outgoing handler stopped for {}", outgoing_id);
        });

        while let Some(msg) = rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(e) = Self::handle_text_frame(&state, &bridge_id, &text).await {
                        tracing::error!("Error handling frame from {}: {}", bridge_id, e);
                    }
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring binary frame: {} bytes", data.len());
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Bridge closing: {}", bridge_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Bridge {} read error: {}", bridge_id, e);
                    break;
                }
            }
        }

        state.router.unregister(&bridge_id).await;
        writer.abort();
    }

    async fn handle_text_frame(
        state: &Arc<GatewayState>,
        bridge_id: &BridgeId,
        text: &str,
    ) -> Result<()> {
        let frame: InboundFrame = serde_json::from_str(text)?;

        match frame {
            InboundFrame::Message(context) => Self::accept_message(state, context),
            InboundFrame::MemberJoin { guild, user } => {
                if state.default_roles.is_empty() {
                    return Ok(());
                }
                tracing::info!("Member {} joined {}, giving default roles", user, guild);
                state
                    .platform
                    .add_roles(&guild, &user, &state.default_roles)
                    .await?;
            }
            InboundFrame::Error { reason } => {
                tracing::warn!("Bridge {} reported an error: {}", bridge_id, reason);
            }
        }
        Ok(())
    }

    /// Dispatch a message on its own task. Bot authors are ignored.
    fn accept_message(state: &Arc<GatewayState>, context: MessageContext) {
        if context.author.bot {
            tracing::debug!("Ignoring message {} from bot {}", context.id, context.author.id);
            return;
        }

        let dispatcher = state.dispatcher.clone();
        tokio::spawn(async move {
            let result = dispatcher.dispatch(&context).await;
            if !result.records.is_empty() {
                tracing::debug!(
                    "Message {} ran {} action(s), deletion: {}",
                    result.message_id,
                    result.records.len(),
                    result.deletion
                );
            }
        });
    }
}

/// Bridge-side client, used by adapters written in Rust and by tests
#[derive(Debug, Clone)]
pub struct BridgeClient {
    url: String,
    token: Option<String>,
}

impl BridgeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Connect to the gateway
    pub async fn connect(&self) -> Result<BridgeConnection> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| GatewayError::AuthenticationFailed(e.to_string()))?;
            request
                .headers_mut()
                .insert(tungstenite::http::header::AUTHORIZATION, value);
        }

        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(BridgeConnection { ws })
    }
}

/// An open bridge connection
pub struct BridgeConnection {
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl std::fmt::Debug for BridgeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConnection").finish_non_exhaustive()
    }
}

impl BridgeConnection {
    /// Send an inbound frame
    pub async fn send(&mut self, frame: &InboundFrame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.ws.send(tungstenite::Message::Text(json)).await?;
        Ok(())
    }

    /// Receive the next text frame; `None` once the gateway hangs up
    pub async fn recv(&mut self) -> Result<Option<String>> {
        while let Some(msg) = self.ws.next().await {
            match msg? {
                tungstenite::Message::Text(text) => return Ok(Some(text)),
                tungstenite::Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
