//! Dependency-ordered group of remote operations.
//!
//! A [`GroupOperation`] is a small DAG scheduler: operations are nodes,
//! [`GroupOperation::add_dependency`] adds edges, a ready queue starts every
//! node whose dependencies have all reached a terminal state, and a join
//! barrier produces one [`GroupReport`] after every node is terminal.
//!
//! A node starts once its dependencies have *finished*, whether they
//! succeeded or not. Member failures are forwarded to an [`ErrorSink`] as
//! they happen and collected in the report; they never abort siblings.
//! Cancelling the group marks nodes that have not started as cancelled and
//! lets the ones already running finish.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{AppError, Result};

use super::error_sink::ErrorSink;

/// Boxed future run by one operation.
pub type OperationFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type OperationFn = Box<dyn FnOnce() -> OperationFuture + Send>;

/// Handle to an operation within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(usize);

/// Terminal state of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Ran to completion.
    Succeeded,
    /// Ran and failed.
    Failed(AppError),
    /// Never started because the group was cancelled.
    Cancelled,
}

/// Aggregate result of a group, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    /// `(operation name, outcome)` for every operation.
    pub outcomes: Vec<(String, OperationOutcome)>,
}

impl GroupReport {
    /// Names of operations that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, OperationOutcome::Succeeded))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Operations that failed, with their errors.
    #[must_use]
    pub fn failed(&self) -> Vec<(&str, &AppError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| match o {
                OperationOutcome::Failed(err) => Some((name.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    /// Names of operations skipped by cancellation.
    #[must_use]
    pub fn cancelled(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, OperationOutcome::Cancelled))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether every operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| matches!(o, OperationOutcome::Succeeded))
    }
}

struct Node {
    name: String,
    run: Option<OperationFn>,
    dependencies: Vec<usize>,
}

/// A set of operations with dependency edges and one completion signal.
pub struct GroupOperation {
    name: String,
    nodes: Vec<Node>,
    cancel: CancellationToken,
}

impl GroupOperation {
    /// Create an empty group.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            nodes: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Group name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an operation. It runs on the runtime's worker pool once its
    /// dependencies have finished.
    pub fn add_operation<F, Fut>(&mut self, name: &str, op: F) -> OperationId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let id = OperationId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_owned(),
            run: Some(Box::new(move || Box::pin(op()) as OperationFuture)),
            dependencies: Vec::new(),
        });
        id
    }

    /// Make `op` wait until `depends_on` has finished.
    ///
    /// An operation may only depend on one added before it, which keeps
    /// the graph acyclic.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidOperation` for unknown ids or a dependency
    /// on the same or a later operation.
    pub fn add_dependency(&mut self, op: OperationId, depends_on: OperationId) -> Result<()> {
        if op.0 >= self.nodes.len() || depends_on.0 >= self.nodes.len() {
            return Err(AppError::InvalidOperation(format!(
                "group {}: unknown operation id",
                self.name
            )));
        }
        if depends_on.0 >= op.0 {
            return Err(AppError::InvalidOperation(format!(
                "group {}: {} must depend on an operation added before it",
                self.name, self.nodes[op.0].name
            )));
        }
        let deps = &mut self.nodes[op.0].dependencies;
        if !deps.contains(&depends_on.0) {
            deps.push(depends_on.0);
        }
        Ok(())
    }

    /// Token that cancels operations not yet started.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the group on a background task.
    #[must_use]
    pub fn spawn(self, sink: Arc<dyn ErrorSink>) -> GroupHandle {
        let cancel = self.cancel.clone();
        let span = info_span!("group_operation", group = %self.name);
        let join = tokio::spawn(async move { self.run(sink.as_ref()).await }.instrument(span));
        GroupHandle { join, cancel }
    }

    /// Run every operation to a terminal state and report once.
    pub async fn run(mut self, sink: &dyn ErrorSink) -> GroupReport {
        let total = self.nodes.len();
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); total];
        for (index, node) in self.nodes.iter().enumerate() {
            for &dep in &node.dependencies {
                dependents[dep].push(index);
            }
        }

        let mut ready: VecDeque<usize> = (0..total).filter(|&i| remaining[i] == 0).collect();
        let mut finished = vec![false; total];
        let mut in_flight: JoinSet<(usize, Result<()>)> = JoinSet::new();
        let mut report = GroupReport::default();

        debug!(group = %self.name, operations = total, "group started");

        loop {
            while let Some(index) = ready.pop_front() {
                let node = &mut self.nodes[index];
                match node.run.take() {
                    Some(run) if !self.cancel.is_cancelled() => {
                        let span = info_span!("operation", operation = %node.name);
                        in_flight.spawn(
                            async move {
                                let result = AssertUnwindSafe(run())
                                    .catch_unwind()
                                    .await
                                    .unwrap_or_else(|_| {
                                        Err(AppError::InvalidOperation("operation panicked".into()))
                                    });
                                (index, result)
                            }
                            .instrument(span),
                        );
                    }
                    _ => {
                        debug!(operation = %node.name, "operation cancelled before start");
                        finished[index] = true;
                        report
                            .outcomes
                            .push((node.name.clone(), OperationOutcome::Cancelled));
                        release(index, &dependents, &mut remaining, &mut ready);
                    }
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok((index, result)) => {
                    finished[index] = true;
                    let name = self.nodes[index].name.clone();
                    let outcome = match result {
                        Ok(()) => OperationOutcome::Succeeded,
                        Err(err) => {
                            warn!(operation = %name, %err, "operation failed");
                            sink.report(&err);
                            OperationOutcome::Failed(err)
                        }
                    };
                    report.outcomes.push((name, outcome));
                    release(index, &dependents, &mut remaining, &mut ready);
                }
                Err(err) => {
                    warn!(%err, "operation task aborted");
                    break;
                }
            }
        }

        // Only reachable after an aborted task: account for everything left.
        for (index, node) in self.nodes.iter().enumerate() {
            if !finished[index] {
                report
                    .outcomes
                    .push((node.name.clone(), OperationOutcome::Cancelled));
            }
        }

        info!(
            group = %self.name,
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            cancelled = report.cancelled().len(),
            "group finished"
        );
        report
    }
}

fn release(
    index: usize,
    dependents: &[Vec<usize>],
    remaining: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    for &dependent in &dependents[index] {
        remaining[dependent] -= 1;
        if remaining[dependent] == 0 {
            ready.push_back(dependent);
        }
    }
}

/// Handle to a spawned group.
pub struct GroupHandle {
    join: JoinHandle<GroupReport>,
    cancel: CancellationToken,
}

impl GroupHandle {
    /// Cancel operations that have not started yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the report.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if the group task was aborted.
    pub async fn wait(self) -> Result<GroupReport> {
        self.join
            .await
            .map_err(|err| AppError::Cancelled(format!("group task ended abnormally: {err}")))
    }
}
