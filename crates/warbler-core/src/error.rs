//! Error types for Warbler Core
//!
//! Every failure the engine can observe falls into one of four families:
//! loading a specification, running an action, talking to the chat platform,
//! or using one of the capability surfaces handed to actions. Each family is
//! its own `thiserror` enum so callers match on exactly what they can get
//! back; action bodies themselves return `anyhow`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::spec::SpecId;

/// A specification file that could not be turned into a command.
///
/// Under the default load policy these are collected per file and the file is
/// left out of the generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("cannot read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("malformed specification {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("specification {path} has no cmdtype")]
    MissingKind { path: PathBuf },

    #[error("specification {path} has unknown cmdtype {kind:?}")]
    UnknownKind { path: PathBuf, kind: String },

    #[error("specification {path} has an empty trigger")]
    EmptyTrigger { path: PathBuf },

    #[error("specification {path} has invalid trigger regex {pattern:?}: {reason}")]
    InvalidRegex {
        path: PathBuf,
        pattern: String,
        reason: String,
    },

    #[error("specification {path} references unknown action {reference:?}")]
    UnresolvedAction { path: PathBuf, reference: String },

    #[error("specification root {path} does not exist")]
    MissingRoot { path: PathBuf },

    #[error("reload from {path} did not complete: {reason}")]
    Interrupted { path: PathBuf, reason: String },
}

impl LoadError {
    /// Path of the file (or root) the error refers to
    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::MissingKind { path }
            | LoadError::UnknownKind { path, .. }
            | LoadError::EmptyTrigger { path }
            | LoadError::InvalidRegex { path, .. }
            | LoadError::UnresolvedAction { path, .. }
            | LoadError::MissingRoot { path }
            | LoadError::Interrupted { path, .. } => path,
        }
    }
}

/// Failure of a single action invocation. Always counted as a `false` vote.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action for {spec} failed: {cause}")]
    Failed { spec: SpecId, cause: String },

    #[error("action for {spec} panicked: {cause}")]
    Panicked { spec: SpecId, cause: String },

    #[error("action for {spec} timed out after {after:?}")]
    TimedOut { spec: SpecId, after: Duration },

    #[error("action for {spec} returned an invalid vote: {detail}")]
    InvalidReturn { spec: SpecId, detail: String },
}

impl ActionError {
    /// Spec whose action failed
    pub fn spec(&self) -> &SpecId {
        match self {
            ActionError::Failed { spec, .. }
            | ActionError::Panicked { spec, .. }
            | ActionError::TimedOut { spec, .. }
            | ActionError::InvalidReturn { spec, .. } => spec,
        }
    }
}

/// Errors raised while performing a platform call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("no platform connection available")]
    Disconnected,

    #[error("platform rejected the request: {0}")]
    Rejected(String),

    #[error("platform transport failure: {0}")]
    Transport(String),
}

/// Errors surfaced to actions by the runtime handle capabilities
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("path exists: {0}")]
    Exists(PathBuf),

    #[error("no such file or directory: {0}")]
    NotFound(PathBuf),

    #[error("path is not a file: {0}")]
    NotFile(PathBuf),

    #[error("path is not a directory: {0}")]
    NotDir(PathBuf),

    #[error("assets in the asset path are read-only: {0}")]
    ReadOnly(PathBuf),

    #[error("path is not in a managed path: {0}")]
    Unmanageable(PathBuf),

    #[error("capability not configured: {0}")]
    Unavailable(&'static str),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
