//! Engine configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deletion::DeletionCoordinator;
use crate::dispatcher::Dispatcher;
use crate::error::LoadError;
use crate::matcher::{Matcher, DEFAULT_PREFIX};
use crate::platform::Platform;
use crate::runtime::{ActionResolver, ActionRuntime, RuntimeHandle, DEFAULT_ACTION_TIMEOUT};
use crate::store::{LoadPolicy, LoadReport, SpecStore};

/// Settings for building a [`Dispatcher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Command prefix for `command` specifications
    pub prefix: String,

    /// Specification roots, in load order
    pub roots: Vec<PathBuf>,

    pub load_policy: LoadPolicy,

    /// `None` disables the per-action deadline
    pub action_timeout: Option<Duration>,

    /// Give actions privileged control over the specification store
    pub store_control: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            roots: Vec::new(),
            load_policy: LoadPolicy::default(),
            action_timeout: Some(DEFAULT_ACTION_TIMEOUT),
            store_control: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn with_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_store_control(mut self, enabled: bool) -> Self {
        self.store_control = enabled;
        self
    }

    /// Load the specifications and wire up a dispatcher.
    ///
    /// Fails only when the load policy is [`LoadPolicy::Abort`] and a file is
    /// bad; otherwise problems are in the returned report.
    pub fn build(
        &self,
        resolver: Arc<dyn ActionResolver>,
        handle: RuntimeHandle,
        platform: Arc<dyn Platform>,
    ) -> Result<(Dispatcher, LoadReport), LoadError> {
        let (store, report) = SpecStore::open(self.roots.clone(), resolver, self.load_policy)?;
        let store = Arc::new(store);

        let handle = if self.store_control {
            handle.with_store(store.clone())
        } else {
            handle
        };
        let runtime = ActionRuntime::new(handle).with_timeout(self.action_timeout);

        let dispatcher = Dispatcher::new(
            store,
            Matcher::new(self.prefix.clone()),
            runtime,
            DeletionCoordinator::new(platform),
        );
        Ok((dispatcher, report))
    }
}
