//! Action runtime
//!
//! Actions are plugins resolved once, when a generation is loaded, and
//! invoked re-entrantly for every matching message. Whatever goes wrong
//! inside an action (an error, a panic, running past the deadline) stops at
//! [`ActionRuntime::invoke`] and comes back as an [`ActionError`].

mod handle;

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;

use crate::context::MessageContext;
use crate::error::ActionError;
use crate::matcher::CommandLine;
use crate::spec::{ActionRef, SpecId};

pub use handle::{
    AssetStore, Helpers, Persistence, RuntimeHandle, SharedModules, SharedModulesBuilder,
    StoreControl,
};

/// Default per-action deadline
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// An executable unit a specification delegates to
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action. The returned boolean is the deletion vote.
    async fn run(
        &self,
        handle: &RuntimeHandle,
        context: &MessageContext,
        command: &str,
        args: &[String],
    ) -> anyhow::Result<bool>;
}

/// Returned by actions whose output cannot be read as a vote
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidVote(pub String);

/// Turns an action reference into an executable action at load time
pub trait ActionResolver: Send + Sync {
    fn resolve(&self, reference: &ActionRef) -> Option<Arc<dyn Action>>;
}

/// Native plugins registered by name, optionally backed by another resolver
#[derive(Default)]
pub struct ActionCatalog {
    actions: HashMap<String, Arc<dyn Action>>,
    fallback: Option<Arc<dyn ActionResolver>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `name`
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        let name = name.into();
        tracing::debug!("Action registered: {}", name);
        self.actions.insert(name, action);
    }

    pub fn with_action(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.register(name, action);
        self
    }

    /// Resolver consulted when no plugin matches
    pub fn with_fallback(mut self, fallback: Arc<dyn ActionResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ActionResolver for ActionCatalog {
    fn resolve(&self, reference: &ActionRef) -> Option<Arc<dyn Action>> {
        self.get(&reference.raw)
            .or_else(|| self.get(reference.name()))
            .or_else(|| {
                self.fallback
                    .as_ref()
                    .and_then(|fallback| fallback.resolve(reference))
            })
    }
}

impl fmt::Debug for ActionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCatalog")
            .field("actions", &self.names())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Invokes actions with the runtime handle and isolates their failures
#[derive(Debug, Clone)]
pub struct ActionRuntime {
    handle: RuntimeHandle,
    timeout: Option<Duration>,
}

impl ActionRuntime {
    pub fn new(handle: RuntimeHandle) -> Self {
        Self {
            handle,
            timeout: Some(DEFAULT_ACTION_TIMEOUT),
        }
    }

    /// Per-action deadline; `None` lets actions run unbounded
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    pub async fn invoke(
        &self,
        spec: &SpecId,
        action: &dyn Action,
        context: &MessageContext,
        line: &CommandLine,
    ) -> Result<bool, ActionError> {
        let run = AssertUnwindSafe(action.run(&self.handle, context, &line.command, &line.args))
            .catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(ActionError::TimedOut {
                        spec: spec.clone(),
                        after: limit,
                    })
                }
            },
            None => run.await,
        };

        match outcome {
            Ok(Ok(vote)) => Ok(vote),
            Ok(Err(err)) => match err.downcast_ref::<InvalidVote>() {
                Some(invalid) => Err(ActionError::InvalidReturn {
                    spec: spec.clone(),
                    detail: invalid.0.clone(),
                }),
                None => Err(ActionError::Failed {
                    spec: spec.clone(),
                    cause: format!("{:#}", err),
                }),
            },
            Err(panic) => Err(ActionError::Panicked {
                spec: spec.clone(),
                cause: panic_message(panic.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
