//! Command specifications
//!
//! A specification is one YAML file describing a trigger, optional gates and
//! the action to run:
//!
//! ```yaml
//! cmdtype: command
//! trigger: slap
//! require:
//!   roles: [Moderator]
//! actions: ./slap.py
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Identity of a specification: its source path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpecId(String);

impl SpecId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.display().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Matching algorithm selector (`cmdtype` in the file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Prefixed command with whitespace-separated arguments
    Command,
    /// Case-insensitive substring
    Contains,
    /// Case-insensitive full-text equality
    Exact,
    /// Unanchored regular expression search
    Regex,
}

impl CommandKind {
    /// Parse the `cmdtype` field. Unknown values yield `None`.
    pub fn parse(cmdtype: &str) -> Option<Self> {
        match cmdtype {
            "command" => Some(CommandKind::Command),
            "contains" => Some(CommandKind::Contains),
            "exact" => Some(CommandKind::Exact),
            "regex" => Some(CommandKind::Regex),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Command => write!(f, "command"),
            CommandKind::Contains => write!(f, "contains"),
            CommandKind::Exact => write!(f, "exact"),
            CommandKind::Regex => write!(f, "regex"),
        }
    }
}

/// What a message is tested against
#[derive(Debug, Clone)]
pub enum Trigger {
    Literal(String),
    Pattern(Regex),
}

impl Trigger {
    pub fn as_str(&self) -> &str {
        match self {
            Trigger::Literal(text) => text,
            Trigger::Pattern(regex) => regex.as_str(),
        }
    }
}

/// Gating rules. A missing or empty set leaves its dimension unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub channels: Option<HashSet<String>>,

    #[serde(default)]
    pub categories: Option<HashSet<String>>,

    #[serde(default)]
    pub roles: Option<HashSet<String>>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// True when no dimension carries a constraint
    pub fn is_unconstrained(&self) -> bool {
        [&self.channels, &self.categories, &self.roles]
            .iter()
            .all(|set| set.as_ref().map_or(true, HashSet::is_empty))
    }
}

/// Reference to the action a specification runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    /// The reference as written (or the spec's base name when omitted)
    pub raw: String,

    /// `raw` joined onto the directory holding the specification
    pub path: PathBuf,

    /// Whether the reference was derived from the spec's sibling base name
    pub sibling: bool,
}

impl ActionRef {
    pub fn explicit(raw: impl Into<String>, spec_path: &Path) -> Self {
        let raw = raw.into();
        let path = spec_dir(spec_path).join(&raw);
        Self {
            raw,
            path,
            sibling: false,
        }
    }

    /// The action sharing the spec's base name in the same directory
    pub fn sibling(spec_path: &Path) -> Self {
        let stem = spec_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: spec_dir(spec_path).join(&stem),
            raw: stem,
            sibling: true,
        }
    }

    /// Plugin name the reference designates: the file stem, or the raw text
    pub fn name(&self) -> &str {
        Path::new(&self.raw)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.raw)
    }
}

fn spec_dir(spec_path: &Path) -> &Path {
    spec_path.parent().unwrap_or_else(|| Path::new("."))
}

/// A validated command specification
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub id: SpecId,
    pub path: PathBuf,
    pub kind: CommandKind,
    pub trigger: Trigger,
    pub requirements: Requirements,
    pub action_ref: ActionRef,
}

/// On-disk shape, before validation
#[derive(Debug, Default, Deserialize)]
struct RawSpec {
    cmdtype: Option<String>,
    trigger: Option<String>,
    require: Option<Requirements>,
    actions: Option<String>,
}

impl CommandSpec {
    /// Build a specification in code, outside of a load pass
    pub fn new(
        id: impl Into<String>,
        kind: CommandKind,
        trigger: &str,
    ) -> Result<Self, LoadError> {
        let id = SpecId::new(id);
        let path = PathBuf::from(id.as_str());
        let trigger = build_trigger(&path, kind, trigger)?;
        Ok(Self {
            action_ref: ActionRef::sibling(&path),
            id,
            path,
            kind,
            trigger,
            requirements: Requirements::default(),
        })
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_action(mut self, reference: impl Into<String>) -> Self {
        self.action_ref = ActionRef::explicit(reference, &self.path);
        self
    }

    /// Parse and validate the YAML text of a specification file
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self, LoadError> {
        let raw: RawSpec = serde_yaml::from_str(text).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let cmdtype = raw
            .cmdtype
            .ok_or_else(|| LoadError::MissingKind {
                path: path.to_path_buf(),
            })?;
        let kind = CommandKind::parse(cmdtype.trim()).ok_or_else(|| LoadError::UnknownKind {
            path: path.to_path_buf(),
            kind: cmdtype.clone(),
        })?;

        let trigger = build_trigger(path, kind, raw.trigger.as_deref().unwrap_or(""))?;

        let action_ref = match raw.actions.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() => ActionRef::explicit(reference, path),
            _ => ActionRef::sibling(path),
        };

        Ok(Self {
            id: SpecId::from_path(path),
            path: path.to_path_buf(),
            kind,
            trigger,
            requirements: raw.require.unwrap_or_default(),
            action_ref,
        })
    }
}

fn build_trigger(path: &Path, kind: CommandKind, trigger: &str) -> Result<Trigger, LoadError> {
    if trigger.is_empty() {
        return Err(LoadError::EmptyTrigger {
            path: path.to_path_buf(),
        });
    }

    match kind {
        CommandKind::Regex => Regex::new(trigger)
            .map(Trigger::Pattern)
            .map_err(|e| LoadError::InvalidRegex {
                path: path.to_path_buf(),
                pattern: trigger.to_string(),
                reason: e.to_string(),
            }),
        _ => Ok(Trigger::Literal(trigger.to_string())),
    }
}
