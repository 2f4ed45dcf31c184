//! Warbler Core - The command dispatch engine for Warbler chat bots
//!
//! Warbler Core turns a directory tree of declarative command specifications
//! into a dispatcher that decides, for every inbound chat message, which
//! actions run and whether the message is deleted afterwards.
//!
//! # Architecture
//!
//! 1. **Specification Store** (`store`): loads YAML specifications into immutable generations
//! 2. **Matcher** (`matcher`): command, contains, exact and regex triggers
//! 3. **Requirement Filter** (`requirements`): channel, category and role gates
//! 4. **Dispatcher** (`dispatcher`): sequential execution in stable load order
//! 5. **Action Runtime** (`runtime`): plugin actions with failure isolation
//! 6. **Deletion Coordinator** (`deletion`): at most one deletion, after every action
//!
//! # Quick Start
//!
//! ```
//! use std::path::Path;
//! use warbler_core::{CommandSpec, Matcher};
//!
//! let spec = CommandSpec::from_yaml(
//!     Path::new("commands/slap.yaml"),
//!     "cmdtype: command\ntrigger: slap\nrequire:\n  roles: [Moderator]\n",
//! )
//! .unwrap();
//!
//! let line = Matcher::new("!")
//!     .match_content(&spec, "!slap bob")
//!     .into_command_line()
//!     .unwrap();
//!
//! assert_eq!(line.command, "slap");
//! assert_eq!(line.args, vec!["bob".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod config;
pub mod context;
pub mod deletion;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod platform;
pub mod requirements;
pub mod runtime;
pub mod spec;
pub mod store;

// Re-export commonly used types for convenience
pub use config::EngineConfig;
pub use context::{Author, ChannelRef, MessageContext, MessageRef};
pub use deletion::{DeletionCoordinator, DeletionOutcome};
pub use dispatcher::{
    DispatchResult, Dispatcher, ExecutionOutcome, ExecutionRecord, PlannedAction,
};
pub use error::{ActionError, CapabilityError, LoadError, PlatformError};
pub use matcher::{CommandLine, MatchOutcome, Matcher, DEFAULT_PREFIX};
pub use platform::{Embed, OutgoingMessage, Platform, SendTarget, Severity};
pub use requirements::permits;
pub use runtime::{
    Action, ActionCatalog, ActionResolver, ActionRuntime, AssetStore, Helpers, InvalidVote,
    Persistence, RuntimeHandle, SharedModules, StoreControl, DEFAULT_ACTION_TIMEOUT,
};
pub use spec::{ActionRef, CommandKind, CommandSpec, Requirements, SpecId, Trigger};
pub use store::{Generation, LoadPolicy, LoadReport, SpecStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
