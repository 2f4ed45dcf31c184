use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use warbler_core::{store, ActionCatalog, Author, ChannelRef, LoadPolicy, MessageContext, RuntimeHandle};
use warbler_gateway::{Bot, BotConfig, BridgePlatform, BridgeRouter, DEFAULT_CONFIG_PATH};

/// Warbler - command dispatch for chat bots
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the bot configuration
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose debug logging (overrides logs.level)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the commands and serve platform bridges
    Serve {
        /// Port to listen on (overrides gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Load every specification and report the ones that fail
    Check {
        /// Output in JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which specifications a message would run, without running them
    Plan {
        /// Message content
        text: String,

        /// Channel name
        #[arg(long, default_value = "general")]
        channel: String,

        /// Channel category
        #[arg(long)]
        category: Option<String>,

        /// Role held by the author (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = BotConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(host) = host {
                config = config.with_host(host);
            }

            tracing::info!("Starting Warbler {}", warbler_gateway::VERSION);
            let bot = Bot::assemble(config, ActionCatalog::new())?;
            println!(
                "Warbler {} serving {} command(s) on ws://{}/ws",
                warbler_gateway::VERSION,
                bot.report().loaded,
                bot.config().socket_addr()?
            );
            bot.run().await?;
        }
        Commands::Check { json } => {
            let resolver = config.script_resolver();
            let roots = config.paths.command_roots();
            tracing::debug!("Checking command roots: {:?}", roots);
            let (_, report) = store::load(&roots, &resolver, LoadPolicy::SkipAndReport, 1)?;

            if json {
                let issues: Vec<String> = report.issues.iter().map(|i| i.to_string()).collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "discovered": report.discovered,
                        "loaded": report.loaded,
                        "issues": issues,
                    })
                );
            } else {
                println!("DISCOVERED: {}", report.discovered);
                println!("LOADED: {}", report.loaded);
                for issue in &report.issues {
                    println!("  ✗ {}", issue);
                }
            }

            if !report.is_clean() {
                tracing::error!(
                    "{} of {} specification(s) failed to load",
                    report.issues.len(),
                    report.discovered
                );
                std::process::exit(1);
            }
        }
        Commands::Plan {
            text,
            channel,
            category,
            roles,
        } => {
            let platform = Arc::new(BridgePlatform::new(Arc::new(BridgeRouter::new())));
            let (dispatcher, _) = config.engine().build(
                Arc::new(config.script_resolver()),
                RuntimeHandle::new(),
                platform,
            )?;

            let mut channel = ChannelRef::new("cli", channel);
            if let Some(category) = category {
                channel = channel.in_category(category);
            }
            let author = Author::new("cli").with_roles(roles);
            let context = MessageContext::new("cli", text, author, channel);

            let planned = dispatcher.plan(&context);
            if planned.is_empty() {
                println!("No specification matches.");
            }
            for (position, action) in planned.iter().enumerate() {
                println!(
                    "{}. {} → {} {:?}",
                    position + 1,
                    action.spec_id,
                    action.command_line.command,
                    action.command_line.args
                );
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level; `--verbose` forces debug
fn init_tracing(config: &BotConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logs.filter() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .init();
}
