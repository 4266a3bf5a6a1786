//! Plan executor.
//!
//! Applies a plan against the provider and the deployed state, one resource
//! at a time in plan order. Transient provider errors are retried with
//! bounded exponential backoff; fatal errors halt the remaining plan and
//! leave the partial state intact for inspection. There is no
//! multi-resource rollback.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{Fingerprinter, SettingsConfig};
use crate::error::{ExecError, GraphError, ProviderError, Result, StackError};
use crate::graph::{AttrValue, Graph, Resource};
use crate::provider::{Outputs, Provider, ResolvedAttrs, capability};
use crate::state::{ApplyHistoryEntry, ApplyOperation, DeployedState, ResourceRecord};

use super::plan::{Action, ActionType, Plan};

/// Upper bound for a single backoff delay.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Cooperative cancellation flag.
///
/// Observed between actions only: an action already in flight with the
/// provider runs to completion so remote state stays well defined.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Creates a new, unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executor tuning options.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum attempts per provider call on transient errors.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub retry_base_ms: u64,
    /// Optional overall deadline, checked at action boundaries.
    pub deadline: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_ms: 500,
            deadline: None,
        }
    }
}

impl From<&SettingsConfig> for ExecutorOptions {
    fn from(settings: &SettingsConfig) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_base_ms: settings.retry_base_ms,
            deadline: settings.deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Executor for reconciliation plans.
#[derive(Debug)]
pub struct Executor<'a, P: Provider> {
    /// Provider to apply actions against.
    provider: &'a P,
    /// Tuning options.
    options: ExecutorOptions,
    /// Cancellation signal.
    cancel: CancelSignal,
    /// Attribute fingerprinter.
    fingerprinter: Fingerprinter,
}

/// How a single action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The provider was invoked and the state updated.
    Applied,
    /// Nothing to do; no provider call was made.
    Skipped,
    /// The action failed.
    Failed,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Action that was executed.
    pub action: Action,
    /// How the action ended.
    pub outcome: ActionOutcome,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing a plan.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Individual action results, in execution order. Actions after a halt
    /// are absent: they were never started.
    pub results: Vec<ActionResult>,
    /// Number of actions applied against the provider.
    pub applied: usize,
    /// Number of actions skipped without side effects.
    pub skipped: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Why execution stopped early, if it did.
    pub halt: Option<ExecError>,
    /// Whether the entire plan was applied.
    pub success: bool,
}

impl<'a, P: Provider> Executor<'a, P> {
    /// Creates a new executor with default options.
    #[must_use]
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            options: ExecutorOptions::default(),
            cancel: CancelSignal::new(),
            fingerprinter: Fingerprinter::new(),
        }
    }

    /// Sets the executor options.
    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the cancellation signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes a plan, mutating `state` as resources are applied.
    ///
    /// The executor is the sole state mutator for the duration of the run;
    /// callers persist the (possibly partial) state afterwards, success or
    /// not.
    ///
    /// # Errors
    ///
    /// Returns an error only for internal inconsistencies between the plan
    /// and the graph. Provider failures, cancellation, and deadline expiry
    /// are reported in the returned [`ExecutionReport`].
    pub async fn execute(
        &self,
        plan: &Plan,
        graph: &Graph,
        state: &mut DeployedState,
    ) -> Result<ExecutionReport> {
        info!(
            "Executing plan: {} actions ({} changes)",
            plan.action_count(),
            plan.changes().len()
        );

        if plan.is_unchanged() {
            let results = plan
                .actions
                .iter()
                .map(|action| ActionResult {
                    action: action.clone(),
                    outcome: ActionOutcome::Skipped,
                    error: None,
                })
                .collect::<Vec<_>>();
            let skipped = results.len();
            return Ok(ExecutionReport {
                results,
                applied: 0,
                skipped,
                failed: 0,
                halt: None,
                success: true,
            });
        }

        let deadline = self.options.deadline.map(|d| Instant::now() + d);
        let mut results: Vec<ActionResult> = Vec::new();
        let mut halt: Option<ExecError> = None;

        for action in &plan.actions {
            if self.cancel.is_cancelled() {
                let applied = results
                    .iter()
                    .filter(|r| r.outcome == ActionOutcome::Applied)
                    .count();
                warn!("Cancellation requested, stopping before {}", action.resource_id);
                halt = Some(ExecError::Cancelled { applied });
                break;
            }

            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                warn!("Deadline elapsed, stopping before {}", action.resource_id);
                halt = Some(ExecError::DeadlineExceeded {
                    resource: action.resource_id.clone(),
                });
                break;
            }

            match self.execute_action(action, graph, state).await {
                Ok(outcome) => {
                    results.push(ActionResult {
                        action: action.clone(),
                        outcome,
                        error: None,
                    });
                }
                Err(err) => {
                    error!("Action failed for {}: {err}", action.resource_id);
                    results.push(ActionResult {
                        action: action.clone(),
                        outcome: ActionOutcome::Failed,
                        error: Some(err.to_string()),
                    });
                    halt = Some(match err {
                        StackError::Exec(exec) => exec,
                        other => ExecError::ActionFailed {
                            resource: action.resource_id.clone(),
                            action: action.action_type.to_string(),
                            message: other.to_string(),
                        },
                    });
                    break;
                }
            }
        }

        let applied = results
            .iter()
            .filter(|r| r.outcome == ActionOutcome::Applied)
            .count();
        let skipped = results
            .iter()
            .filter(|r| r.outcome == ActionOutcome::Skipped)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.outcome == ActionOutcome::Failed)
            .count();
        let success = halt.is_none();

        let operation = if plan.destroy {
            ApplyOperation::Destroy
        } else {
            ApplyOperation::Apply
        };
        let changed: Vec<String> = plan
            .changes()
            .iter()
            .map(|a| a.resource_id.clone())
            .collect();

        if success {
            if !plan.destroy {
                state.config_hash.clone_from(&plan.config_hash);
            }
            state.add_history(ApplyHistoryEntry::new(operation, &plan.config_hash, changed));
        } else if let Some(reason) = &halt {
            state.add_history(ApplyHistoryEntry::failed(
                operation,
                &plan.config_hash,
                changed,
                &reason.to_string(),
            ));
        }

        Ok(ExecutionReport {
            results,
            applied,
            skipped,
            failed,
            halt,
            success,
        })
    }

    /// Executes a single action.
    async fn execute_action(
        &self,
        action: &Action,
        graph: &Graph,
        state: &mut DeployedState,
    ) -> Result<ActionOutcome> {
        debug!("Executing: {}", action.description());

        match action.action_type {
            ActionType::Noop => Ok(ActionOutcome::Skipped),
            ActionType::Create | ActionType::Update => {
                self.apply_resource(action, graph, state).await
            }
            ActionType::Delete => self.delete_resource(action, state).await,
        }
    }

    /// Applies a create or update action.
    async fn apply_resource(
        &self,
        action: &Action,
        graph: &Graph,
        state: &mut DeployedState,
    ) -> Result<ActionOutcome> {
        let resource = graph.get(&action.resource_id).ok_or_else(|| {
            StackError::internal(format!(
                "Plan references undeclared resource: {}",
                action.resource_id
            ))
        })?;

        // References resolve against records written earlier in this run;
        // plan order guarantees dependencies were applied first.
        let resolved = Self::resolve_attrs(resource, state)?;
        let fingerprint = self.fingerprinter.fingerprint_resource(resource);

        // Idempotence is decided from recorded state, not a provider
        // re-query: skip only when both the declaration and the resolved
        // attribute snapshot are unchanged.
        if let Some(record) = state.get_record(&resource.id)
            && Fingerprinter::hashes_match(&record.fingerprint, &fingerprint)
            && record.attributes == resolved
        {
            debug!("Resource {} already applied, skipping", resource.id);
            return Ok(ActionOutcome::Skipped);
        }

        let existing = state.get_record(&resource.id).cloned();
        let outputs = match &existing {
            None => self.create_with_provider(resource, &resolved).await?,
            Some(record) => {
                if capability(resource.kind).supports_update {
                    let previous = record.outputs.clone();
                    self.call_provider(&resource.id, "update", || {
                        self.provider.update(resource.kind, &previous, &resolved)
                    })
                    .await?
                } else {
                    // No in-place update for this kind: replace it.
                    debug!("Kind {} does not update in place, replacing", resource.kind);
                    self.delete_with_provider(&resource.id, resource.kind, &record.outputs)
                        .await?;
                    self.create_with_provider(resource, &resolved).await?
                }
            }
        };

        let mut record = existing.map_or_else(
            || ResourceRecord::new(&resource.id, resource.kind, &fingerprint, 0),
            |mut existing| {
                existing.fingerprint.clone_from(&fingerprint);
                existing
            },
        );
        if record.seq == 0 {
            record.seq = state.next_seq();
        }
        record.attributes = resolved;
        record.set_outputs(outputs);
        state.set_record(record);

        info!("Applied {} '{}'", action.action_type, resource.id);
        Ok(ActionOutcome::Applied)
    }

    /// Applies a delete action.
    async fn delete_resource(
        &self,
        action: &Action,
        state: &mut DeployedState,
    ) -> Result<ActionOutcome> {
        let Some(record) = state.get_record(&action.resource_id) else {
            debug!(
                "No record for {}, considering delete successful",
                action.resource_id
            );
            return Ok(ActionOutcome::Skipped);
        };

        let kind = record.kind;
        let outputs = record.outputs.clone();
        self.delete_with_provider(&action.resource_id, kind, &outputs)
            .await?;

        state.remove_record(&action.resource_id);
        info!("Deleted {} '{}'", kind, action.resource_id);
        Ok(ActionOutcome::Applied)
    }

    /// Creates a resource with the provider.
    async fn create_with_provider(
        &self,
        resource: &Resource,
        resolved: &ResolvedAttrs,
    ) -> Result<Outputs> {
        self.call_provider(&resource.id, "create", || {
            self.provider.create(resource.kind, resolved)
        })
        .await
    }

    /// Deletes a resource with the provider, tolerating already-gone.
    async fn delete_with_provider(
        &self,
        resource_id: &str,
        kind: crate::graph::ResourceKind,
        outputs: &Outputs,
    ) -> Result<()> {
        match self
            .call_provider(resource_id, "delete", || self.provider.delete(kind, outputs))
            .await
        {
            Ok(()) => Ok(()),
            Err(StackError::Provider(ProviderError::ApiRequestFailed { status: 404, .. })) => {
                info!("Resource {resource_id} was already deleted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Invokes a provider operation, retrying transient errors with bounded
    /// exponential backoff.
    async fn call_provider<T, F, Fut>(&self, resource: &str, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.options.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff_delay(attempt, &err);
                    warn!(
                        "Transient error on {op_name} '{resource}' \
                         (attempt {attempt}/{max_attempts}): {err}; retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(StackError::Exec(ExecError::MaxRetriesExceeded {
                        resource: resource.to_string(),
                        attempts: max_attempts,
                        message: err.to_string(),
                    }));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Computes the delay before the next attempt. A server-provided hint
    /// (e.g. Retry-After) wins over the computed backoff when larger.
    fn backoff_delay(&self, attempt: u32, err: &StackError) -> Duration {
        let shift = (attempt - 1).min(10);
        let backoff = self
            .options
            .retry_base_ms
            .saturating_mul(1 << shift)
            .min(MAX_BACKOFF_MS);
        let hint_ms = err.retry_delay_secs().map_or(0, |secs| secs * 1000);
        Duration::from_millis(backoff.max(hint_ms))
    }

    /// Resolves a resource's attributes against the deployed state.
    fn resolve_attrs(resource: &Resource, state: &DeployedState) -> Result<ResolvedAttrs> {
        let mut resolved = BTreeMap::new();
        for (key, value) in &resource.attributes {
            resolved.insert(key.clone(), Self::resolve_value(&resource.id, value, state)?);
        }
        Ok(resolved)
    }

    /// Resolves one attribute value, following references into applied
    /// records.
    fn resolve_value(
        owner: &str,
        value: &AttrValue,
        state: &DeployedState,
    ) -> Result<serde_json::Value> {
        let unresolved = |target: &str, attribute: &str| {
            StackError::Graph(GraphError::UnresolvedReference {
                resource: owner.to_string(),
                target: target.to_string(),
                attribute: attribute.to_string(),
            })
        };

        Ok(match value {
            AttrValue::Null => serde_json::Value::Null,
            AttrValue::Bool(b) => serde_json::Value::Bool(*b),
            AttrValue::Int(i) => serde_json::Value::from(*i),
            AttrValue::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            AttrValue::String(s) => serde_json::Value::String(s.clone()),
            AttrValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| Self::resolve_value(owner, item, state))
                    .collect::<Result<_>>()?,
            ),
            AttrValue::Map(map) => {
                let mut object = serde_json::Map::new();
                for (key, val) in map {
                    object.insert(key.clone(), Self::resolve_value(owner, val, state)?);
                }
                serde_json::Value::Object(object)
            }
            AttrValue::Ref(reference) => {
                let record = state
                    .get_record(&reference.target)
                    .ok_or_else(|| unresolved(&reference.target, &reference.attribute))?;

                if let Some(output) = record.output(&reference.attribute) {
                    serde_json::Value::String(output.to_string())
                } else if let Some(snapshot) = record.attributes.get(&reference.attribute) {
                    snapshot.clone()
                } else {
                    return Err(unresolved(&reference.target, &reference.attribute));
                }
            }
        })
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} applied, {} skipped, {} failed",
            self.results.len(),
            self.applied,
            self.skipped,
            self.failed
        )?;
        if let Some(halt) = &self.halt {
            write!(f, " (halted: {halt})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Reference, ResourceKind};
    use crate::planner::Planner;
    use crate::provider::MockProvider;
    use mockall::Sequence;
    use mockall::predicate::eq;

    fn attr(key: &str, value: &str) -> (String, AttrValue) {
        (key.to_string(), AttrValue::String(value.to_string()))
    }

    fn outputs_for(prefix: &str) -> Outputs {
        BTreeMap::from([
            (String::from("id"), format!("{prefix}-1")),
            (String::from("arn"), format!("arn:{prefix}-1")),
        ])
    }

    /// table <- role (depends_on) <- function (reference to role.arn)
    fn chain_graph() -> Graph {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Table,
                "match-table",
                BTreeMap::from([attr("name", "favorite-team-matches"), attr("partition_key", "uniqueId")]),
                vec![],
            )
            .expect("declare");
        builder
            .declare(
                ResourceKind::Role,
                "lambda-role",
                BTreeMap::from([attr("service", "lambda.amazonaws.com")]),
                vec![String::from("match-table")],
            )
            .expect("declare");
        builder
            .declare(
                ResourceKind::Function,
                "recorder-fn",
                BTreeMap::from([
                    attr("handler", "org.recorder.service.SoccerRecorderHandler::handleRequest"),
                    attr("runtime", "java17"),
                    (
                        String::from("role"),
                        AttrValue::Ref(Reference::new("lambda-role", "arn")),
                    ),
                ]),
                vec![],
            )
            .expect("declare");
        builder.build().expect("graph should build")
    }

    fn fast_options() -> ExecutorOptions {
        ExecutorOptions {
            max_retries: 3,
            retry_base_ms: 1,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_full_create_resolves_references() {
        let graph = chain_graph();
        let mut state = DeployedState::new("backend", "dev");
        let plan = Planner::new().plan(&graph, &state);

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .times(3)
            .returning(|kind, _| Ok(outputs_for(&kind.to_string())));

        let executor = Executor::new(&provider).with_options(fast_options());
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute should succeed");

        assert!(report.success);
        assert_eq!(report.applied, 3);
        assert_eq!(state.record_ids().len(), 3);
        assert_eq!(state.config_hash, plan.config_hash);

        // The function's role reference resolved to the role's arn output.
        let function = state.get_record("recorder-fn").expect("record exists");
        assert_eq!(
            function.attributes.get("role"),
            Some(&serde_json::Value::String(String::from("arn:role-1")))
        );

        // Apply sequence follows plan order.
        let table_seq = state.get_record("match-table").expect("record").seq;
        let role_seq = state.get_record("lambda-role").expect("record").seq;
        let fn_seq = function.seq;
        assert!(table_seq < role_seq && role_seq < fn_seq);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_without_provider_calls() {
        let graph = chain_graph();
        let mut state = DeployedState::new("backend", "dev");
        let planner = Planner::new();

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .times(3)
            .returning(|kind, _| Ok(outputs_for(&kind.to_string())));
        let executor = Executor::new(&provider).with_options(fast_options());
        let plan = planner.plan(&graph, &state);
        executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("first run succeeds");

        // Second run: all noop, so a provider with no expectations must
        // never be called.
        let silent = MockProvider::new();
        let executor = Executor::new(&silent).with_options(fast_options());
        let replan = planner.plan(&graph, &state);
        assert!(replan.is_unchanged());

        let report = executor
            .execute(&replan, &graph, &mut state)
            .await
            .expect("second run succeeds");
        assert!(report.success);
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 3);
    }

    #[tokio::test]
    async fn test_fatal_error_halts_and_preserves_partial_state() {
        let graph = chain_graph();
        let mut state = DeployedState::new("backend", "dev");
        let plan = Planner::new().plan(&graph, &state);

        let mut provider = MockProvider::new();
        provider
            .expect_create()
            .with(eq(ResourceKind::Table), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(outputs_for("table")));
        provider
            .expect_create()
            .with(eq(ResourceKind::Role), mockall::predicate::always())
            .times(1)
            .returning(|_, _| {
                Err(StackError::Provider(ProviderError::api_error(
                    400,
                    "service principal rejected",
                )))
            });

        let executor = Executor::new(&provider).with_options(fast_options());
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute returns a report");

        assert!(!report.success);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        // The function action was never started.
        assert_eq!(report.results.len(), 2);
        assert!(matches!(
            report.halt,
            Some(ExecError::ActionFailed { ref resource, .. }) if resource == "lambda-role"
        ));

        // Partial state: the table survived, nothing else.
        assert!(state.get_record("match-table").is_some());
        assert!(state.get_record("lambda-role").is_none());
        assert!(state.get_record("recorder-fn").is_none());
        assert!(state.history.last().is_some_and(|h| !h.success));
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_then_succeeds() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Table,
                "match-table",
                BTreeMap::from([attr("name", "m"), attr("partition_key", "pk")]),
                vec![],
            )
            .expect("declare");
        let graph = builder.build().expect("graph builds");

        let mut state = DeployedState::new("backend", "dev");
        let plan = Planner::new().plan(&graph, &state);

        let mut provider = MockProvider::new();
        let mut seq = Sequence::new();
        provider
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(StackError::Provider(ProviderError::network(
                    "connection reset",
                )))
            });
        provider
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(outputs_for("table")));

        let executor = Executor::new(&provider).with_options(fast_options());
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute succeeds");

        assert!(report.success);
        assert_eq!(report.applied, 1);
        assert!(state.get_record("match-table").is_some());
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_reports_max_retries() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Table,
                "match-table",
                BTreeMap::from([attr("name", "m"), attr("partition_key", "pk")]),
                vec![],
            )
            .expect("declare");
        let graph = builder.build().expect("graph builds");

        let mut state = DeployedState::new("backend", "dev");
        let plan = Planner::new().plan(&graph, &state);

        let mut provider = MockProvider::new();
        provider.expect_create().times(2).returning(|_, _| {
            Err(StackError::Provider(ProviderError::network("still down")))
        });

        let options = ExecutorOptions {
            max_retries: 2,
            retry_base_ms: 1,
            deadline: None,
        };
        let executor = Executor::new(&provider).with_options(options);
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute returns a report");

        assert!(!report.success);
        assert!(matches!(
            report.halt,
            Some(ExecError::MaxRetriesExceeded { attempts: 2, .. })
        ));
        assert!(state.get_record("match-table").is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_already_gone() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Table,
                "keep-table",
                BTreeMap::from([attr("name", "k"), attr("partition_key", "pk")]),
                vec![],
            )
            .expect("declare");
        let graph = builder.build().expect("graph builds");

        // State knows a resource that is no longer declared.
        let mut state = DeployedState::new("backend", "dev");
        let seq = state.next_seq();
        state.set_record(ResourceRecord::new("keep-table", ResourceKind::Table, "match", seq));
        let keep_fingerprint = Fingerprinter::new()
            .fingerprint_resource(graph.get("keep-table").expect("declared"));
        state
            .get_record_mut("keep-table")
            .expect("record")
            .fingerprint = keep_fingerprint;
        let seq = state.next_seq();
        let mut orphan = ResourceRecord::new("old-rule", ResourceKind::Rule, "x", seq);
        orphan.set_outputs(outputs_for("rule"));
        state.set_record(orphan);

        let plan = Planner::new().plan(&graph, &state);
        assert_eq!(plan.delete_count(), 1);

        let mut provider = MockProvider::new();
        provider.expect_delete().times(1).returning(|_, _| {
            Err(StackError::Provider(ProviderError::api_error(
                404,
                "rule not found",
            )))
        });

        let executor = Executor::new(&provider).with_options(fast_options());
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute succeeds");

        assert!(report.success);
        assert!(state.get_record("old-rule").is_none());
        // The still-declared table was untouched.
        assert!(state.get_record("keep-table").is_some());
    }

    #[tokio::test]
    async fn test_replace_strategy_for_non_updatable_kind() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Policy,
                "lambda-policy",
                BTreeMap::from([attr("statements", "allow-logs")]),
                vec![],
            )
            .expect("declare");
        let graph = builder.build().expect("graph builds");

        let mut state = DeployedState::new("backend", "dev");
        let seq = state.next_seq();
        let mut record =
            ResourceRecord::new("lambda-policy", ResourceKind::Policy, "old-fingerprint", seq);
        record.set_outputs(outputs_for("policy"));
        state.set_record(record);

        let plan = Planner::new().plan(&graph, &state);
        assert_eq!(plan.update_count(), 1);

        let mut provider = MockProvider::new();
        let mut seq = Sequence::new();
        provider
            .expect_delete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        provider
            .expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(outputs_for("policy-v2")));

        let executor = Executor::new(&provider).with_options(fast_options());
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute succeeds");

        assert!(report.success);
        let record = state.get_record("lambda-policy").expect("record exists");
        assert_eq!(record.output("id"), Some("policy-v2-1"));
    }

    #[tokio::test]
    async fn test_unresolved_reference_halts_the_run() {
        let graph = chain_graph();
        let mut state = DeployedState::new("backend", "dev");

        // A hand-built plan that starts at the function, whose role
        // reference has never been applied.
        let plan = Plan {
            config_hash: String::from("hash"),
            destroy: false,
            actions: vec![Action {
                action_type: ActionType::Create,
                resource_id: String::from("recorder-fn"),
                resource_kind: ResourceKind::Function,
                reason: String::new(),
                new_fingerprint: Some(String::from("fp")),
            }],
        };

        let provider = MockProvider::new();
        let executor = Executor::new(&provider).with_options(fast_options());
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute returns a report");

        assert!(!report.success);
        assert_eq!(report.failed, 1);
        let error = report.results[0].error.as_deref().unwrap_or_default();
        assert!(error.contains("lambda-role"), "error: {error}");
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_action() {
        let graph = chain_graph();
        let mut state = DeployedState::new("backend", "dev");
        let plan = Planner::new().plan(&graph, &state);

        let cancel = CancelSignal::new();
        cancel.cancel();

        let provider = MockProvider::new();
        let executor = Executor::new(&provider)
            .with_options(fast_options())
            .with_cancel(cancel);
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute returns a report");

        assert!(!report.success);
        assert!(matches!(report.halt, Some(ExecError::Cancelled { applied: 0 })));
        assert!(report.results.is_empty());
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_checked_at_action_boundary() {
        let graph = chain_graph();
        let mut state = DeployedState::new("backend", "dev");
        let plan = Planner::new().plan(&graph, &state);

        let options = ExecutorOptions {
            max_retries: 1,
            retry_base_ms: 1,
            deadline: Some(Duration::ZERO),
        };
        let provider = MockProvider::new();
        let executor = Executor::new(&provider).with_options(options);
        let report = executor
            .execute(&plan, &graph, &mut state)
            .await
            .expect("execute returns a report");

        assert!(!report.success);
        assert!(matches!(
            report.halt,
            Some(ExecError::DeadlineExceeded { ref resource }) if resource == "match-table"
        ));
    }
}
