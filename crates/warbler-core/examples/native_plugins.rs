//! Example: Native plugin dispatch
//!
//! Builds a generation in code, registers two native actions and dispatches a
//! few messages against a platform that only prints what it is asked to do.
//! Run with: cargo run --example native_plugins

use std::sync::Arc;

use async_trait::async_trait;
use warbler_core::{
    Action, ActionRuntime, Author, ChannelRef, CommandKind, CommandSpec, DeletionCoordinator,
    Dispatcher, Generation, Matcher, MessageContext, MessageRef, OutgoingMessage, Platform,
    PlatformError, Requirements, RuntimeHandle, SendTarget, SpecStore,
};

struct PrintingPlatform;

#[async_trait]
impl Platform for PrintingPlatform {
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError> {
        println!("   🗑  delete {} in {}", message.id, message.channel_id);
        Ok(())
    }

    async fn send_message(
        &self,
        target: &SendTarget,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        println!("   💬 {:?}: {:?}", target, message.content);
        Ok(())
    }

    async fn add_roles(&self, _: &str, user: &str, roles: &[String]) -> Result<(), PlatformError> {
        println!("   ➕ {} {:?}", user, roles);
        Ok(())
    }

    async fn remove_roles(
        &self,
        _: &str,
        user: &str,
        roles: &[String],
    ) -> Result<(), PlatformError> {
        println!("   ➖ {} {:?}", user, roles);
        Ok(())
    }
}

/// `!slap <who>`, keeps the original message
struct Slap;

#[async_trait]
impl Action for Slap {
    async fn run(
        &self,
        _handle: &RuntimeHandle,
        context: &MessageContext,
        _command: &str,
        args: &[String],
    ) -> anyhow::Result<bool> {
        let target = args.first().map(String::as_str).unwrap_or("nobody");
        println!("   👋 {} slaps {} around with a large trout", context.author.name, target);
        Ok(false)
    }
}

/// Swallows messages containing a banned word
struct Filter;

#[async_trait]
impl Action for Filter {
    async fn run(
        &self,
        _handle: &RuntimeHandle,
        _context: &MessageContext,
        _command: &str,
        _args: &[String],
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let slap = CommandSpec::new("fun/slap.yaml", CommandKind::Command, "slap")?
        .with_requirements(Requirements::new().with_roles(["Member"]));
    let filter = CommandSpec::new("mod/filter.yaml", CommandKind::Contains, "heck")?;

    let generation = Generation::from_parts(
        1,
        vec![
            (slap, Arc::new(Slap) as Arc<dyn Action>),
            (filter, Arc::new(Filter) as Arc<dyn Action>),
        ],
    );

    let dispatcher = Dispatcher::new(
        Arc::new(SpecStore::with_generation(generation)),
        Matcher::default(),
        ActionRuntime::new(RuntimeHandle::new()),
        DeletionCoordinator::new(Arc::new(PrintingPlatform)),
    );

    let member = Author::new("u1").with_name("alice").with_roles(["Member"]);
    let guest = Author::new("u2").with_name("bob");
    let general = ChannelRef::new("c1", "general");

    for (id, content, author) in [
        ("m1", "!slap bob", member.clone()),
        ("m2", "!slap alice", guest),
        ("m3", "!slap what the heck", member),
    ] {
        println!("📨 {}: {}", author.name, content);
        let context = MessageContext::new(id, content, author, general.clone());
        let result = dispatcher.dispatch(&context).await;
        println!(
            "   → {} action(s), deletion: {}\n",
            result.records.len(),
            result.deletion
        );
    }

    Ok(())
}
