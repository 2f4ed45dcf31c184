//! Specification store
//!
//! Loads every specification under the configured roots into an immutable
//! [`Generation`] and publishes it with an atomic pointer swap. Dispatches
//! hold an `Arc` to the generation they started with, so a reload never
//! changes what an in-flight dispatch sees.
//!
//! Load order is the execution order for messages matching several specs:
//! roots in the order they were given, and within a root files sorted by full
//! path.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::LoadError;
use crate::runtime::{Action, ActionCatalog, ActionResolver, StoreControl};
use crate::spec::{CommandSpec, SpecId};

/// What to do when a specification file fails to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Leave the file out, report it, keep loading
    #[default]
    SkipAndReport,
    /// Fail the whole load on the first bad file
    Abort,
}

/// Summary of one load pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub generation: u64,
    pub discovered: usize,
    pub loaded: usize,
    pub issues: Vec<LoadError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// One immutable snapshot of the loaded specifications
pub struct Generation {
    number: u64,
    loaded_at: DateTime<Utc>,
    specs: Vec<CommandSpec>,
    actions: HashMap<SpecId, Arc<dyn Action>>,
}

impl Generation {
    pub fn empty() -> Self {
        Self::from_parts(0, Vec::new())
    }

    /// Assemble a generation from already-resolved specs, keeping their order.
    /// A repeated spec id keeps its first occurrence.
    pub fn from_parts(number: u64, entries: Vec<(CommandSpec, Arc<dyn Action>)>) -> Self {
        let mut specs = Vec::with_capacity(entries.len());
        let mut actions = HashMap::with_capacity(entries.len());

        for (spec, action) in entries {
            if actions.contains_key(&spec.id) {
                tracing::warn!("Duplicate specification id ignored: {}", spec.id);
                continue;
            }
            actions.insert(spec.id.clone(), action);
            specs.push(spec);
        }

        Self {
            number,
            loaded_at: Utc::now(),
            specs,
            actions,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Specifications in execution order
    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    pub fn action(&self, id: &SpecId) -> Option<&Arc<dyn Action>> {
        self.actions.get(id)
    }

    pub fn spec_ids(&self) -> Vec<SpecId> {
        self.specs.iter().map(|spec| spec.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("number", &self.number)
            .field("loaded_at", &self.loaded_at)
            .field("specs", &self.spec_ids())
            .finish()
    }
}

/// Load every specification under `roots`
pub fn load(
    roots: &[PathBuf],
    resolver: &dyn ActionResolver,
    policy: LoadPolicy,
    number: u64,
) -> Result<(Generation, LoadReport), LoadError> {
    let mut report = LoadReport {
        generation: number,
        ..LoadReport::default()
    };
    let record = |issue: LoadError, report: &mut LoadReport| -> Result<(), LoadError> {
        match policy {
            LoadPolicy::Abort => Err(issue),
            LoadPolicy::SkipAndReport => {
                tracing::warn!("Skipping specification: {}", issue);
                report.issues.push(issue);
                Ok(())
            }
        }
    };

    let (files, discovery_issues) = discover(roots);
    for issue in discovery_issues {
        record(issue, &mut report)?;
    }
    report.discovered = files.len();

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        match load_file(&path, resolver) {
            Ok(entry) => entries.push(entry),
            Err(issue) => record(issue, &mut report)?,
        }
    }

    let generation = Generation::from_parts(number, entries);
    report.loaded = generation.len();
    Ok((generation, report))
}

fn load_file(
    path: &Path,
    resolver: &dyn ActionResolver,
) -> Result<(CommandSpec, Arc<dyn Action>), LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let spec = CommandSpec::from_yaml(path, &text)?;

    let action = resolver
        .resolve(&spec.action_ref)
        .ok_or_else(|| LoadError::UnresolvedAction {
            path: path.to_path_buf(),
            reference: spec.action_ref.raw.clone(),
        })?;

    tracing::debug!("Loaded {} specification {}", spec.kind, spec.id);
    Ok((spec, action))
}

/// Specification files in load order, plus anything that could not be walked
fn discover(roots: &[PathBuf]) -> (Vec<PathBuf>, Vec<LoadError>) {
    let mut files = Vec::new();
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for root in roots {
        if !root.is_dir() {
            issues.push(LoadError::MissingRoot { path: root.clone() });
            continue;
        }

        let mut in_root = Vec::new();
        for entry in WalkDir::new(root) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_spec_file(entry.path()) => {
                    in_root.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => issues.push(LoadError::Io {
                    path: e.path().map_or_else(|| root.clone(), Path::to_path_buf),
                    reason: e.to_string(),
                }),
            }
        }
        in_root.sort();

        for path in in_root {
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if seen.insert(key) {
                files.push(path);
            }
        }
    }

    (files, issues)
}

fn is_spec_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Owner of the active generation
pub struct SpecStore {
    roots: Vec<PathBuf>,
    resolver: Arc<dyn ActionResolver>,
    policy: LoadPolicy,
    current: ArcSwap<Generation>,
    next_number: AtomicU64,
    reload_lock: Mutex<()>,
}

impl SpecStore {
    /// A store with an empty generation; call [`SpecStore::reload_blocking`] to fill it
    pub fn new(
        roots: Vec<PathBuf>,
        resolver: Arc<dyn ActionResolver>,
        policy: LoadPolicy,
    ) -> Self {
        Self {
            roots,
            resolver,
            policy,
            current: ArcSwap::from_pointee(Generation::empty()),
            next_number: AtomicU64::new(1),
            reload_lock: Mutex::new(()),
        }
    }

    /// Build the store and perform the first load
    pub fn open(
        roots: Vec<PathBuf>,
        resolver: Arc<dyn ActionResolver>,
        policy: LoadPolicy,
    ) -> Result<(Self, LoadReport), LoadError> {
        let store = Self::new(roots, resolver, policy);
        let report = store.reload_blocking()?;
        Ok((store, report))
    }

    /// A store serving a prebuilt generation, with no roots to reload from
    pub fn with_generation(generation: Generation) -> Self {
        let store = Self::new(Vec::new(), Arc::new(ActionCatalog::new()), LoadPolicy::default());
        store
            .next_number
            .store(generation.number() + 1, Ordering::SeqCst);
        store.current.store(Arc::new(generation));
        store
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// The active generation
    pub fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    /// Rebuild from the roots on the calling thread and swap the result in.
    /// On failure the active generation is left untouched.
    ///
    /// Meant for startup; running actions go through [`StoreControl::reload`],
    /// which moves the filesystem walk off the async workers.
    pub fn reload_blocking(&self) -> Result<LoadReport, LoadError> {
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let (generation, report) = load(&self.roots, self.resolver.as_ref(), self.policy, number)?;
        self.publish(generation, &report);
        Ok(report)
    }

    /// Publish a generation built elsewhere
    pub fn replace(&self, generation: Generation) {
        let _guard = self.reload_lock.lock();
        let number = generation.number();
        self.next_number
            .fetch_max(number + 1, Ordering::SeqCst);
        self.current.store(Arc::new(generation));
        tracing::info!("Generation {} published", number);
    }

    /// Swap in a freshly loaded generation unless a newer one won the race
    fn publish(&self, generation: Generation, report: &LoadReport) {
        let _guard = self.reload_lock.lock();
        let active = self.current.load().number();
        if generation.number() < active {
            tracing::warn!(
                "Discarding generation {}, generation {} is already active",
                generation.number(),
                active
            );
            return;
        }
        self.current.store(Arc::new(generation));

        tracing::info!(
            "Loaded {} commands (generation {}, {} skipped)",
            report.loaded,
            report.generation,
            report.issues.len()
        );
    }
}

#[async_trait]
impl StoreControl for SpecStore {
    async fn reload(&self) -> Result<LoadReport, LoadError> {
        let roots = self.roots.clone();
        let resolver = self.resolver.clone();
        let policy = self.policy;
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);

        let (generation, report) = tokio::task::spawn_blocking(move || {
            load(&roots, resolver.as_ref(), policy, number)
        })
        .await
        .map_err(|e| LoadError::Interrupted {
            path: self.roots.first().cloned().unwrap_or_default(),
            reason: e.to_string(),
        })??;

        self.publish(generation, &report);
        Ok(report)
    }

    fn generation(&self) -> u64 {
        self.current.load().number()
    }

    fn spec_ids(&self) -> Vec<SpecId> {
        self.current.load().spec_ids()
    }
}

impl fmt::Debug for SpecStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecStore")
            .field("roots", &self.roots)
            .field("policy", &self.policy)
            .field("current", &self.current.load().number())
            .finish()
    }
}
