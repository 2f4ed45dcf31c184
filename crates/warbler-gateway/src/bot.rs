//! Bot assembly
//!
//! Wires a [`BotConfig`] into a running engine: the bridge-backed platform,
//! the capability surfaces of the runtime handle, the action resolver chain
//! and finally the gateway that feeds messages in.

use std::sync::Arc;

use tokio::net::TcpListener;
use warbler_core::{
    ActionCatalog, Dispatcher, LoadReport, Persistence, Platform, RuntimeHandle, SharedModules,
};

use crate::assets::FsAssetStore;
use crate::channel::BridgeRouter;
use crate::config::BotConfig;
use crate::gateway::Gateway;
use crate::helpers::PlatformHelpers;
use crate::persistence::DocumentStore;
use crate::platform::BridgePlatform;
use crate::{GatewayError, Result};

/// A fully wired bot, ready to serve
#[derive(Debug)]
pub struct Bot {
    config: BotConfig,
    dispatcher: Dispatcher,
    router: Arc<BridgeRouter>,
    report: LoadReport,
}

impl Bot {
    /// Build every collaborator and perform the first load.
    ///
    /// Native plugins in `catalog` take precedence; anything they do not
    /// cover is resolved as a script next to its specification.
    pub fn assemble(config: BotConfig, catalog: ActionCatalog) -> Result<Self> {
        Self::assemble_with_modules(config, catalog, SharedModules::default())
    }

    /// Like [`Bot::assemble`], additionally sharing the host's `modules` with
    /// every action. The bot's own configuration is always registered as
    /// `config`.
    pub fn assemble_with_modules(
        config: BotConfig,
        catalog: ActionCatalog,
        modules: SharedModules,
    ) -> Result<Self> {
        let router = Arc::new(BridgeRouter::new());
        let platform: Arc<dyn Platform> = Arc::new(BridgePlatform::new(router.clone()));

        let persistence: Arc<dyn Persistence> = Arc::new(open_database(&config)?);
        if modules.contains("config") {
            tracing::warn!("Shared module 'config' is reserved, replacing the host's");
        }
        let modules = modules.to_builder().with("config", config.clone()).build();

        let mut handle = RuntimeHandle::new()
            .with_helpers(Arc::new(PlatformHelpers::new(
                platform.clone(),
                &config.admin,
            )))
            .with_persistence(persistence)
            .with_modules(modules);

        match (&config.paths.asset_path, &config.paths.store_path) {
            (Some(assets), Some(store)) => {
                let assets = FsAssetStore::new(assets, store)
                    .with_command_roots(config.paths.command_roots());
                handle = handle.with_assets(Arc::new(assets));
            }
            _ => tracing::warn!("Asset or store path not configured, file access disabled"),
        }

        let resolver = Arc::new(catalog.with_fallback(Arc::new(config.script_resolver())));
        let (dispatcher, report) = config.engine().build(resolver, handle, platform)?;

        tracing::info!(
            "Loaded {} of {} specifications (generation {})",
            report.loaded,
            report.discovered,
            report.generation
        );
        for issue in &report.issues {
            tracing::warn!("Skipped specification: {}", issue);
        }

        Ok(Self {
            config,
            dispatcher,
            router,
            report,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn router(&self) -> &Arc<BridgeRouter> {
        &self.router
    }

    /// Report of the initial load
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.dispatcher.clone(), self.router.clone())
            .with_default_roles(self.config.default_roles.clone())
            .with_auth_token(self.config.gateway.auth_token.clone())
    }

    /// Serve bridges on the configured address until ctrl-c
    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        let gateway = Arc::new(self.gateway());

        let signal_gateway = gateway.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal_gateway.shutdown();
            }
        });

        gateway.serve(listener).await
    }
}

fn open_database(config: &BotConfig) -> Result<DocumentStore> {
    let store = match &config.database.path {
        Some(path) => DocumentStore::open(path),
        None => DocumentStore::open_in_memory(),
    };
    store.map_err(|e| GatewayError::Persistence(format!("{:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs;
    use warbler_core::{Action, Author, ChannelRef, MessageContext};

    fn config(root: &std::path::Path) -> BotConfig {
        let mut config = BotConfig::new().with_commands_path(vec![root.join("commands")]);
        config.database.path = None;
        config.paths.asset_path = Some(root.join("assets"));
        config.paths.store_path = Some(root.join("store"));
        config.paths.modules_path = None;
        config
    }

    #[test]
    fn test_assemble_reports_unresolved_actions() {
        let dir = tempfile::tempdir().unwrap();
        let commands = dir.path().join("commands");
        fs::create_dir_all(&commands).unwrap();
        fs::write(commands.join("ping.yaml"), "cmdtype: command\ntrigger: ping\n").unwrap();
        fs::write(commands.join("ping.sh"), "echo false\n").unwrap();
        fs::write(commands.join("orphan.yaml"), "cmdtype: command\ntrigger: orphan\n").unwrap();

        let bot = Bot::assemble(config(dir.path()), ActionCatalog::new()).unwrap();

        assert_eq!(bot.report().discovered, 2);
        assert_eq!(bot.report().loaded, 1);
        assert_eq!(bot.report().issues.len(), 1);
        assert_eq!(bot.dispatcher().store().current().len(), 1);
        assert_eq!(
            bot.dispatcher().store().roots(),
            &[dir.path().join("commands")]
        );
    }

    #[tokio::test]
    async fn test_dispatch_without_bridge_reports_failed_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let commands = dir.path().join("commands");
        fs::create_dir_all(&commands).unwrap();
        fs::write(commands.join("hush.yaml"), "cmdtype: contains\ntrigger: hush\n").unwrap();
        fs::write(commands.join("hush.sh"), "cat > /dev/null\necho true\n").unwrap();

        let bot = Bot::assemble(config(dir.path()), ActionCatalog::new()).unwrap();
        let context = MessageContext::new(
            "m1",
            "please hush",
            Author::new("u1"),
            ChannelRef::new("c1", "general"),
        );

        let result = bot.dispatcher().dispatch(&context).await;
        assert!(result.should_delete);
        assert!(!result.deletion.is_deleted());
    }

    struct Greeting(&'static str);

    /// Records the greeting module and the configured prefix it can see
    struct Greet {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Action for Greet {
        async fn run(
            &self,
            handle: &RuntimeHandle,
            _context: &MessageContext,
            _command: &str,
            _args: &[String],
        ) -> anyhow::Result<bool> {
            let greeting = handle
                .modules()
                .get::<Greeting>("greeting")
                .ok_or_else(|| anyhow::anyhow!("greeting module missing"))?;
            let config = handle
                .modules()
                .get::<BotConfig>("config")
                .ok_or_else(|| anyhow::anyhow!("config module missing"))?;
            self.seen
                .lock()
                .push(format!("{} {}", greeting.0, config.prefix));
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_actions_see_host_modules_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let commands = dir.path().join("commands");
        fs::create_dir_all(&commands).unwrap();
        fs::write(
            commands.join("greet.yaml"),
            "cmdtype: command\ntrigger: greet\nactions: greet\n",
        )
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let catalog =
            ActionCatalog::new().with_action("greet", Arc::new(Greet { seen: seen.clone() }));
        let modules = SharedModules::builder()
            .with("greeting", Greeting("howdy"))
            .with("config", 7u8)
            .build();

        let bot = Bot::assemble_with_modules(config(dir.path()), catalog, modules).unwrap();
        let context = MessageContext::new(
            "m1",
            "!greet",
            Author::new("u1"),
            ChannelRef::new("c1", "general"),
        );
        let result = bot.dispatcher().dispatch(&context).await;

        assert!(!result.should_delete);
        assert_eq!(*seen.lock(), vec!["howdy !".to_string()]);
    }
}
