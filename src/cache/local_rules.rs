//! Local evaluation of proposable calls against the schema replica.

use std::sync::Arc;

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::replica::SchemaReplica;
use crate::common::{ProposableKind, Result};
use crate::cursor::{CursorContext, Proposal, ProposableCall, StreamManager};

/// Rules that can be answered from a replica of type `S`.
pub trait RuleEvaluator<S>: Send + Sync {
    /// Whether the rule for `kind` on `column` (or the whole row) is known
    /// to the replica.
    fn is_local(&self, kind: ProposableKind, column: Option<&str>) -> bool;

    fn evaluate(&self, replica: &S, call: ProposableCall<'_>) -> Result<Proposal>;
}

/// The [`CursorContext`] of a process that keeps a schema replica.
///
/// Evaluation holds the cache lock in shared mode, so it never observes a
/// rebuild in progress. Nothing is local while the replica is unbuilt or
/// marked stale.
pub struct LocalRuleContext<S: SchemaReplica> {
    coordinator: Arc<CacheCoordinator<S>>,
    evaluator: Box<dyn RuleEvaluator<S>>,
    streams: Option<Arc<dyn StreamManager>>,
}

impl<S: SchemaReplica> LocalRuleContext<S> {
    pub fn new(coordinator: Arc<CacheCoordinator<S>>, evaluator: Box<dyn RuleEvaluator<S>>) -> Self {
        Self {
            coordinator,
            evaluator,
            streams: None,
        }
    }

    pub fn with_streams(mut self, streams: Arc<dyn StreamManager>) -> Self {
        self.streams = Some(streams);
        self
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator<S>> {
        &self.coordinator
    }
}

impl<S: SchemaReplica> CursorContext for LocalRuleContext<S> {
    fn is_local(&self, kind: ProposableKind, column: Option<&str>) -> bool {
        self.coordinator.server_timestamp() > 0 && self.evaluator.is_local(kind, column)
    }

    fn evaluate(&self, call: ProposableCall<'_>) -> Result<Proposal> {
        let replica = self.coordinator.acquire_shared()?;
        self.evaluator.evaluate(&replica, call)
    }

    fn streams(&self) -> Option<&dyn StreamManager> {
        self.streams.as_deref()
    }
}
