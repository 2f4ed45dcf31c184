//! E2E tests for the bridge gateway
//!
//! A bot is assembled from a temporary command tree, served on an ephemeral
//! port and driven through a real WebSocket bridge connection.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use warbler_core::{Action, ActionCatalog, Author, ChannelRef, MessageContext, RuntimeHandle};
use warbler_gateway::{Bot, BotConfig, BridgeClient, BridgeConnection, Gateway, InboundFrame};

type Log = Arc<Mutex<Vec<String>>>;

/// Records who triggered it and votes to delete
struct Hush {
    log: Log,
}

#[async_trait]
impl Action for Hush {
    async fn run(
        &self,
        _handle: &RuntimeHandle,
        context: &MessageContext,
        _command: &str,
        _args: &[String],
    ) -> anyhow::Result<bool> {
        self.log.lock().push(context.author.id.clone());
        Ok(true)
    }
}

fn config(root: &Path, token: Option<&str>) -> BotConfig {
    let commands = root.join("commands");
    fs::create_dir_all(&commands).unwrap();
    fs::write(
        commands.join("hush.yaml"),
        "cmdtype: command\ntrigger: hush\nactions: hush\n",
    )
    .unwrap();

    let mut config = BotConfig::new()
        .with_commands_path(vec![commands])
        .with_port(0);
    config.database.path = None;
    config.paths.asset_path = None;
    config.paths.store_path = None;
    config.gateway.auth_token = token.map(str::to_string);
    config
}

fn bot(config: BotConfig, log: Log) -> Bot {
    let catalog = ActionCatalog::new().with_action("hush", Arc::new(Hush { log }));
    Bot::assemble(config, catalog).unwrap()
}

async fn serve(bot: &Bot) -> (Arc<Gateway>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Arc::new(bot.gateway());

    let server = gateway.clone();
    tokio::spawn(async move { server.serve(listener).await });
    (gateway, addr)
}

fn message(id: &str, author: Author) -> InboundFrame {
    InboundFrame::Message(
        MessageContext::new(id, "!hush now", author, ChannelRef::new("c1", "general"))
            .in_guild("g1"),
    )
}

async fn next_frame(connection: &mut BridgeConnection) -> serde_json::Value {
    let text = tokio::time::timeout(Duration::from_secs(5), connection.recv())
        .await
        .expect("frame within five seconds")
        .unwrap()
        .expect("connection open");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn e2e_bridge_message_is_deleted_once_and_bots_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Arc::default();
    let bot = bot(config(dir.path(), None), log.clone());
    let (gateway, addr) = serve(&bot).await;

    let mut bridge = BridgeClient::new(format!("ws://{}/ws", addr))
        .connect()
        .await
        .unwrap();

    bridge
        .send(&message("m-bot", Author::new("b1").as_bot()))
        .await
        .unwrap();
    bridge
        .send(&message("m-human", Author::new("u1")))
        .await
        .unwrap();

    let frame = next_frame(&mut bridge).await;
    assert_eq!(
        frame,
        serde_json::json!({"type": "delete_message", "channel_id": "c1", "message_id": "m-human"})
    );
    assert_eq!(*log.lock(), vec!["u1".to_string()]);

    bridge.close().await.unwrap();
    gateway.shutdown();
}

#[tokio::test]
async fn e2e_member_join_receives_default_roles() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), None);
    config.default_roles = vec!["Member".into(), "Guest".into()];
    let bot = bot(config, Arc::default());

    let (gateway, addr) = serve(&bot).await;
    let mut bridge = BridgeClient::new(format!("ws://{}/ws", addr))
        .connect()
        .await
        .unwrap();

    bridge
        .send(&InboundFrame::MemberJoin {
            guild: "g1".into(),
            user: "u7".into(),
        })
        .await
        .unwrap();

    let frame = next_frame(&mut bridge).await;
    assert_eq!(frame["type"], "add_roles");
    assert_eq!(frame["user"], "u7");
    assert_eq!(frame["roles"], serde_json::json!(["Member", "Guest"]));

    gateway.shutdown();
}

#[tokio::test]
async fn e2e_bearer_token_required_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let bot = bot(config(dir.path(), Some("s3cret")), Arc::default());
    let (gateway, addr) = serve(&bot).await;
    let url = format!("ws://{}/ws", addr);

    assert!(BridgeClient::new(url.clone()).connect().await.is_err());
    assert!(BridgeClient::new(url.clone())
        .with_token("wrong")
        .connect()
        .await
        .is_err());

    let mut bridge = BridgeClient::new(url).with_token("s3cret").connect().await.unwrap();
    bridge.close().await.unwrap();

    gateway.shutdown();
}

#[tokio::test]
async fn e2e_status_reports_generation_and_specs() {
    let dir = tempfile::tempdir().unwrap();
    let bot = bot(config(dir.path(), None), Arc::default());
    let (gateway, addr) = serve(&bot).await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let status: serde_json::Value = serde_json::from_str(body.trim()).unwrap();
    assert_eq!(status["generation"], 1);
    assert_eq!(status["specs"], 1);
    assert_eq!(status["bridges"], 0);

    gateway.shutdown();
}
