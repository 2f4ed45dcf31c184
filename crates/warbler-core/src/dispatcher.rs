//! Per-message dispatch
//!
//! A dispatch takes one generation snapshot, selects the specifications that
//! match and whose gates pass, runs their actions one after the other in load
//! order, ORs the votes and hands the result to the deletion coordinator.
//! Dispatches for different messages are independent and may run
//! concurrently.

use std::sync::Arc;

use crate::context::MessageContext;
use crate::deletion::{DeletionCoordinator, DeletionOutcome};
use crate::error::ActionError;
use crate::matcher::{CommandLine, Matcher};
use crate::requirements::permits;
use crate::runtime::ActionRuntime;
use crate::spec::SpecId;
use crate::store::{Generation, SpecStore};

/// Result of one action invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Voted(bool),
    /// Counted as a `false` vote
    Failed(ActionError),
}

impl ExecutionOutcome {
    pub fn vote(&self) -> bool {
        matches!(self, ExecutionOutcome::Voted(true))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub spec_id: SpecId,
    pub command_line: CommandLine,
    pub outcome: ExecutionOutcome,
}

/// A specification selected to run, before anything ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub spec_id: SpecId,
    pub command_line: CommandLine,
}

/// Everything one dispatch did, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub message_id: String,
    /// Generation the dispatch ran against
    pub generation: u64,
    pub records: Vec<ExecutionRecord>,
    pub should_delete: bool,
    pub deletion: DeletionOutcome,
}

impl DispatchResult {
    pub fn failures(&self) -> impl Iterator<Item = &ActionError> {
        self.records.iter().filter_map(|record| match &record.outcome {
            ExecutionOutcome::Failed(err) => Some(err),
            ExecutionOutcome::Voted(_) => None,
        })
    }

    pub fn executed(&self) -> Vec<&SpecId> {
        self.records.iter().map(|record| &record.spec_id).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<SpecStore>,
    matcher: Matcher,
    runtime: ActionRuntime,
    deletion: DeletionCoordinator,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SpecStore>,
        matcher: Matcher,
        runtime: ActionRuntime,
        deletion: DeletionCoordinator,
    ) -> Self {
        Self {
            store,
            matcher,
            runtime,
            deletion,
        }
    }

    pub fn store(&self) -> &Arc<SpecStore> {
        &self.store
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Specifications that would run for `context` against the active
    /// generation, without running them
    pub fn plan(&self, context: &MessageContext) -> Vec<PlannedAction> {
        select(&self.store.current(), &self.matcher, context)
    }

    pub async fn dispatch(&self, context: &MessageContext) -> DispatchResult {
        let generation = self.store.current();
        let selected = select(&generation, &self.matcher, context);

        let mut records = Vec::with_capacity(selected.len());
        let mut should_delete = false;

        for planned in selected {
            let Some(action) = generation.action(&planned.spec_id) else {
                tracing::warn!(
                    "No action for {} in generation {}, skipping",
                    planned.spec_id,
                    generation.number()
                );
                continue;
            };

            let outcome = match self
                .runtime
                .invoke(&planned.spec_id, action.as_ref(), context, &planned.command_line)
                .await
            {
                Ok(vote) => ExecutionOutcome::Voted(vote),
                Err(err) => {
                    tracing::error!("{}", err);
                    ExecutionOutcome::Failed(err)
                }
            };

            should_delete |= outcome.vote();
            records.push(ExecutionRecord {
                spec_id: planned.spec_id,
                command_line: planned.command_line,
                outcome,
            });
        }

        let deletion = self.deletion.finalize(context, should_delete).await;

        if !records.is_empty() {
            tracing::debug!(
                "Message {} ran {} actions (generation {}), deletion {}",
                context.id,
                records.len(),
                generation.number(),
                deletion
            );
        }

        DispatchResult {
            message_id: context.id.clone(),
            generation: generation.number(),
            records,
            should_delete,
            deletion,
        }
    }
}

fn select(generation: &Generation, matcher: &Matcher, context: &MessageContext) -> Vec<PlannedAction> {
    generation
        .specs()
        .iter()
        .filter_map(|spec| {
            let line = matcher.matches(spec, context).into_command_line()?;
            if !permits(&spec.requirements, context) {
                tracing::trace!("{} matched but its requirements denied it", spec.id);
                return None;
            }
            Some(PlannedAction {
                spec_id: spec.id.clone(),
                command_line: line,
            })
        })
        .collect()
}
