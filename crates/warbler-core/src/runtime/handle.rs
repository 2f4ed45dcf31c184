//! The handle passed to every action
//!
//! Exactly five capability surfaces, each behind its own trait so actions can
//! be exercised against mocks. Surfaces that were never configured answer
//! with [`CapabilityError::Unavailable`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{Author, MessageContext};
use crate::error::{CapabilityError, LoadError};
use crate::platform::{Embed, OutgoingMessage, Severity};
use crate::spec::SpecId;
use crate::store::LoadReport;

/// File access by logical path: a read-only asset tree and a writable store
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn read_asset(&self, path: &str) -> Result<Vec<u8>, CapabilityError>;

    /// Read `path` relative to the directory holding `origin`, usually the
    /// calling action's own spec or script. The result must still fall under
    /// the asset, store or commands roots.
    async fn read_relative(&self, origin: &Path, path: &str) -> Result<Vec<u8>, CapabilityError>;

    async fn read_stored(&self, path: &str) -> Result<Vec<u8>, CapabilityError>;

    async fn write_stored(&self, path: &str, contents: &[u8]) -> Result<(), CapabilityError>;

    async fn make_dir(&self, path: &str, parents: bool) -> Result<(), CapabilityError>;
}

/// Shared utility surface for common chat operations
#[async_trait]
pub trait Helpers: Send + Sync {
    /// Bot owner or configured administrator
    fn is_admin(&self, author: &Author) -> bool;

    /// Embed whose description leads with the severity emote
    fn simple_embed(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        severity: Option<Severity>,
    ) -> Embed {
        Embed::simple(title, description, severity)
    }

    /// Reply in the message's channel, or privately to its author
    async fn send_message(
        &self,
        context: &MessageContext,
        message: OutgoingMessage,
        as_dm: bool,
    ) -> Result<(), CapabilityError>;

    async fn give_role(
        &self,
        context: &MessageContext,
        user: &str,
        role: &str,
    ) -> Result<(), CapabilityError>;

    async fn take_role(
        &self,
        context: &MessageContext,
        user: &str,
        role: &str,
    ) -> Result<(), CapabilityError>;
}

/// Privileged control over the specification store
#[async_trait]
pub trait StoreControl: Send + Sync {
    /// Rebuild from disk and swap generations. In-flight dispatches keep the
    /// generation they started with.
    async fn reload(&self) -> Result<LoadReport, LoadError>;

    fn generation(&self) -> u64;

    fn spec_ids(&self) -> Vec<SpecId>;
}

/// JSON documents keyed by collection and key
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, CapabilityError>;

    async fn put(
        &self,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), CapabilityError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, CapabilityError>;

    async fn keys(&self, collection: &str) -> Result<Vec<String>, CapabilityError>;
}

type Module = Arc<dyn Any + Send + Sync>;

/// Immutable registry of modules shared by all actions, built at startup
#[derive(Clone, Default)]
pub struct SharedModules {
    modules: Arc<BTreeMap<String, Module>>,
}

impl SharedModules {
    pub fn builder() -> SharedModulesBuilder {
        SharedModulesBuilder::default()
    }

    /// A builder seeded with every module registered here
    pub fn to_builder(&self) -> SharedModulesBuilder {
        SharedModulesBuilder {
            modules: self.modules.as_ref().clone(),
        }
    }

    /// Typed lookup; `None` if absent or registered with another type
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.modules
            .get(name)
            .cloned()
            .and_then(|module| module.downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for SharedModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

#[derive(Default)]
pub struct SharedModulesBuilder {
    modules: BTreeMap<String, Module>,
}

impl fmt::Debug for SharedModulesBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

impl SharedModulesBuilder {
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, module: T) -> Self {
        self.modules.insert(name.into(), Arc::new(module));
        self
    }

    pub fn build(self) -> SharedModules {
        SharedModules {
            modules: Arc::new(self.modules),
        }
    }
}

/// Stand-in for surfaces that were not configured
struct Unconfigured;

#[async_trait]
impl AssetStore for Unconfigured {
    async fn read_asset(&self, _path: &str) -> Result<Vec<u8>, CapabilityError> {
        Err(CapabilityError::Unavailable("assets"))
    }

    async fn read_relative(
        &self,
        _origin: &Path,
        _path: &str,
    ) -> Result<Vec<u8>, CapabilityError> {
        Err(CapabilityError::Unavailable("assets"))
    }

    async fn read_stored(&self, _path: &str) -> Result<Vec<u8>, CapabilityError> {
        Err(CapabilityError::Unavailable("assets"))
    }

    async fn write_stored(&self, _path: &str, _contents: &[u8]) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("assets"))
    }

    async fn make_dir(&self, _path: &str, _parents: bool) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("assets"))
    }
}

#[async_trait]
impl Helpers for Unconfigured {
    fn is_admin(&self, _author: &Author) -> bool {
        false
    }

    async fn send_message(
        &self,
        _context: &MessageContext,
        _message: OutgoingMessage,
        _as_dm: bool,
    ) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("helpers"))
    }

    async fn give_role(
        &self,
        _context: &MessageContext,
        _user: &str,
        _role: &str,
    ) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("helpers"))
    }

    async fn take_role(
        &self,
        _context: &MessageContext,
        _user: &str,
        _role: &str,
    ) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("helpers"))
    }
}

#[async_trait]
impl Persistence for Unconfigured {
    async fn get(
        &self,
        _collection: &str,
        _key: &str,
    ) -> Result<Option<serde_json::Value>, CapabilityError> {
        Err(CapabilityError::Unavailable("persistence"))
    }

    async fn put(
        &self,
        _collection: &str,
        _key: &str,
        _value: serde_json::Value,
    ) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("persistence"))
    }

    async fn delete(&self, _collection: &str, _key: &str) -> Result<bool, CapabilityError> {
        Err(CapabilityError::Unavailable("persistence"))
    }

    async fn keys(&self, _collection: &str) -> Result<Vec<String>, CapabilityError> {
        Err(CapabilityError::Unavailable("persistence"))
    }
}

/// Capabilities forwarded to actions
#[derive(Clone)]
pub struct RuntimeHandle {
    assets: Arc<dyn AssetStore>,
    helpers: Arc<dyn Helpers>,
    store: Option<Arc<dyn StoreControl>>,
    persistence: Arc<dyn Persistence>,
    modules: SharedModules,
}

impl Default for RuntimeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeHandle {
    /// A handle with every surface unconfigured
    pub fn new() -> Self {
        Self {
            assets: Arc::new(Unconfigured),
            helpers: Arc::new(Unconfigured),
            store: None,
            persistence: Arc::new(Unconfigured),
            modules: SharedModules::default(),
        }
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_helpers(mut self, helpers: Arc<dyn Helpers>) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StoreControl>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_modules(mut self, modules: SharedModules) -> Self {
        self.modules = modules;
        self
    }

    pub fn assets(&self) -> &dyn AssetStore {
        self.assets.as_ref()
    }

    pub fn helpers(&self) -> &dyn Helpers {
        self.helpers.as_ref()
    }

    /// Present only when the host granted store control
    pub fn store(&self) -> Option<&dyn StoreControl> {
        self.store.as_deref()
    }

    pub fn persistence(&self) -> &dyn Persistence {
        self.persistence.as_ref()
    }

    pub fn modules(&self) -> &SharedModules {
        &self.modules
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("store_control", &self.store.is_some())
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}
