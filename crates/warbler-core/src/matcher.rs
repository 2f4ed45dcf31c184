//! Trigger matching
//!
//! One algorithm per [`CommandKind`]. Matching is a pure function of the
//! specification and the message text.

use serde::{Deserialize, Serialize};

use crate::context::MessageContext;
use crate::spec::{CommandKind, CommandSpec, Trigger};

/// Default command prefix
pub const DEFAULT_PREFIX: &str = "!";

/// Command token and arguments handed to an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub command: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// Result of testing one specification against one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Miss,
    Hit(CommandLine),
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Hit(_))
    }

    pub fn into_command_line(self) -> Option<CommandLine> {
        match self {
            MatchOutcome::Hit(line) => Some(line),
            MatchOutcome::Miss => None,
        }
    }
}

/// Trigger matcher configured with the command prefix
#[derive(Debug, Clone)]
pub struct Matcher {
    prefix: String,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Matcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, spec: &CommandSpec, context: &MessageContext) -> MatchOutcome {
        self.match_content(spec, &context.content)
    }

    /// Match raw text. Non-command kinds pass the whole content on as the
    /// command with no arguments.
    pub fn match_content(&self, spec: &CommandSpec, content: &str) -> MatchOutcome {
        let hit = match (spec.kind, &spec.trigger) {
            (CommandKind::Command, Trigger::Literal(trigger)) => {
                return self.match_command(trigger, content);
            }
            (CommandKind::Contains, trigger) => contains_ignore_case(content, trigger.as_str()),
            (CommandKind::Exact, trigger) => equals_ignore_case(content, trigger.as_str()),
            (CommandKind::Regex, Trigger::Pattern(regex)) => regex.is_match(content),
            // Built outside `CommandSpec::from_yaml` with a mismatched trigger
            (CommandKind::Command, Trigger::Pattern(_))
            | (CommandKind::Regex, Trigger::Literal(_)) => false,
        };

        if hit {
            MatchOutcome::Hit(CommandLine::new(content, Vec::new()))
        } else {
            MatchOutcome::Miss
        }
    }

    fn match_command(&self, trigger: &str, content: &str) -> MatchOutcome {
        let Some(rest) = content
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(trigger))
        else {
            return MatchOutcome::Miss;
        };

        // The trigger must end at a word boundary
        if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
            return MatchOutcome::Miss;
        }

        let args = rest.split_whitespace().map(str::to_string).collect();
        MatchOutcome::Hit(CommandLine::new(trigger, args))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn equals_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
