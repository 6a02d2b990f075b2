//! The workflow execution engine.
//!
//! A single logical cursor walks the chain from the start node: render the
//! node's input fields against the accumulated scope, invoke its adapter,
//! record the result, and advance. Switch nodes branch to the first matching
//! path, foreach nodes iterate their body strictly sequentially, and confirm
//! nodes suspend the run until a decision arrives out-of-band.
//!
//! There is no concurrent fan-out across branches or iterations; sample
//! records must stay attributable to a specific iteration index, and later
//! iterations may depend on side effects of earlier ones.

use crate::adapter::{AdapterRegistry, RunContext};
use crate::confirm::{ConfirmRecord, ConfirmStore, WorkUnit};
use crate::definition::Workflow;
use crate::error::{EngineError, GraphError};
use crate::expression::{IterScope, Scope};
use crate::instance::{
    InstanceNode, InstanceStatus, InstanceStore, RecordSource, WorkflowInstance,
};
use crate::node::{Node, NodeKind, SwitchConfig};
use crate::settings::EngineSettings;
use chrono::Utc;
use flywheel_auth::AuthorizerResolver;
use flywheel_core::{ConfirmId, InstanceNodeId, NodeId, TriggerId};
use serde_json::{Value as JsonValue, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// The outcome of walking one chain (or sub-chain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// The chain reached a terminal node.
    Completed,
    /// The chain suspended at a confirm node.
    Suspended { confirm_id: ConfirmId },
    /// A node failed; the remainder of the chain was not executed.
    Failed { node_id: NodeId, reason: String },
}

/// The result of a full run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The finalized instance.
    pub instance: WorkflowInstance,
    /// IDs of every record written, in execution order.
    pub records: Vec<InstanceNodeId>,
    /// The pending confirmation, when the run suspended.
    pub confirm_id: Option<ConfirmId>,
}

/// The workflow interpreter.
pub struct Executor {
    adapters: Arc<AdapterRegistry>,
    instances: Arc<dyn InstanceStore>,
    confirms: Arc<dyn ConfirmStore>,
    resolver: Option<Arc<dyn AuthorizerResolver>>,
    settings: EngineSettings,
}

impl Executor {
    /// Creates an executor over the given registry and stores.
    #[must_use]
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        instances: Arc<dyn InstanceStore>,
        confirms: Arc<dyn ConfirmStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            adapters,
            instances,
            confirms,
            resolver: None,
            settings,
        }
    }

    /// Sets the authorizer resolver for credential-bearing nodes.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn AuthorizerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Executes the chain reachable from `start` with the given input.
    ///
    /// One record is written per executed node. A failing node aborts the
    /// remainder but already-written records survive.
    ///
    /// # Errors
    ///
    /// Returns an error on infrastructure failures (storage, malformed
    /// templates, step budget exhaustion). Adapter failures are not errors
    /// at this level; they finalize the instance as failed.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        start: NodeId,
        input: JsonValue,
        trigger_id: Option<TriggerId>,
    ) -> Result<RunOutcome, EngineError> {
        let instance = WorkflowInstance::new(workflow.id, trigger_id);
        self.instances.insert_instance(instance.clone()).await?;

        let mut scope = Scope::new(input);
        self.drive(workflow, instance, start, &mut scope).await
    }

    /// Resumes a suspended instance from a re-enqueued unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance is missing or execution hits an
    /// infrastructure failure.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        unit: WorkUnit,
    ) -> Result<RunOutcome, EngineError> {
        let mut instance = self.instances.get_instance(unit.instance_id).await?;
        instance.status = InstanceStatus::Running;
        self.instances.update_instance(instance.clone()).await?;

        let mut scope = unit.scope;
        self.drive(workflow, instance, unit.start_node, &mut scope)
            .await
    }

    /// Runs one node in isolation with the manual-run timeout, recording a
    /// manual-test sample.
    ///
    /// Control nodes are not testable; they are excluded from the needful
    /// set in the first place.
    ///
    /// # Errors
    ///
    /// Returns an error for control nodes, unregistered classes, or a run
    /// exceeding the manual timeout. Adapter failures produce a failed
    /// record, not an error.
    pub async fn test_node(
        &self,
        workflow: &Workflow,
        node_id: NodeId,
        scope: &Scope,
    ) -> Result<InstanceNode, EngineError> {
        let node = workflow
            .graph
            .get_node(node_id)
            .ok_or(GraphError::NodeNotFound { node_id })?;
        if node.kind() != NodeKind::Action {
            return Err(EngineError::Graph(GraphError::InvalidConfig {
                node_id,
                reason: "control nodes are not testable".to_string(),
            }));
        }

        let rendered = scope.render_fields(&node.input_fields)?;
        let ctx = self.run_context(workflow, node, rendered.clone()).await?;
        let adapter = self.adapters.get(node.class.as_str())?;

        let result = tokio::time::timeout(self.settings.manual_run_timeout(), adapter.run(ctx))
            .await
            .map_err(|_| EngineError::Timeout { node_id })?;

        let record = InstanceNode::new(workflow.id, None, node_id, RecordSource::ManualTest)
            .with_input(JsonValue::Object(rendered));
        let record = match result {
            Ok(output) => record.with_output(output),
            Err(err) => record.failed(json!({"error": err.to_string()})),
        };
        self.instances.record_node(record.clone()).await?;
        Ok(record)
    }

    /// Drives a chain to completion and finalizes the instance.
    async fn drive(
        &self,
        workflow: &Workflow,
        mut instance: WorkflowInstance,
        start: NodeId,
        scope: &mut Scope,
    ) -> Result<RunOutcome, EngineError> {
        let mut steps = 0usize;
        let mut records = Vec::new();

        let outcome = self
            .run_chain(workflow, &instance, start, scope, &mut steps, &mut records)
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                // Infrastructure failure: finalize what we can, then surface.
                instance.status = InstanceStatus::Failed;
                instance.finished_at = Some(Utc::now());
                self.instances.update_instance(instance).await?;
                return Err(err);
            }
        };

        let confirm_id = match &outcome {
            ChainOutcome::Completed => {
                instance.pass();
                None
            }
            ChainOutcome::Suspended { confirm_id } => {
                instance.suspend();
                Some(*confirm_id)
            }
            ChainOutcome::Failed { node_id, reason } => {
                warn!(node = %node_id, %reason, "workflow instance failed");
                instance.fail(*node_id);
                None
            }
        };
        self.instances.update_instance(instance.clone()).await?;

        Ok(RunOutcome {
            instance,
            records,
            confirm_id,
        })
    }

    /// Walks a chain from `head` until a terminal node, failure, or
    /// suspension.
    async fn run_chain(
        &self,
        workflow: &Workflow,
        instance: &WorkflowInstance,
        head: NodeId,
        scope: &mut Scope,
        steps: &mut usize,
        records: &mut Vec<InstanceNodeId>,
    ) -> Result<ChainOutcome, EngineError> {
        let mut cursor = Some(head);

        while let Some(node_id) = cursor {
            *steps += 1;
            if *steps > self.settings.step_budget {
                return Err(EngineError::StepBudgetExceeded {
                    budget: self.settings.step_budget,
                });
            }

            let node = workflow
                .graph
                .get_node(node_id)
                .ok_or(GraphError::NodeNotFound { node_id })?;
            debug!(node = %node_id, class = %node.class, "executing node");

            cursor = match node.kind() {
                NodeKind::Action => {
                    match self
                        .run_action(workflow, instance, node, scope, records)
                        .await?
                    {
                        ActionStep::Advance(next) => next,
                        ActionStep::Failed { reason } => {
                            return Ok(ChainOutcome::Failed { node_id, reason });
                        }
                    }
                }
                NodeKind::Switch => {
                    self.run_switch(workflow, instance, node, scope, records)
                        .await?
                }
                NodeKind::Foreach => {
                    match self
                        .run_foreach(workflow, instance, node, scope, steps, records)
                        .await?
                    {
                        ChainStep::Continue(next) => next,
                        ChainStep::Stop(outcome) => return Ok(outcome),
                    }
                }
                NodeKind::Confirm => {
                    let config = node.confirm_config()?;
                    let record = ConfirmRecord::new(
                        workflow.id,
                        instance.id,
                        node_id,
                        node.transition,
                        scope.clone(),
                        config.expires_in_hours,
                    );
                    let confirm_id = self.confirms.insert(record).await?;
                    return Ok(ChainOutcome::Suspended { confirm_id });
                }
            };
        }

        Ok(ChainOutcome::Completed)
    }

    /// Executes an action node; the failure record is written here.
    async fn run_action(
        &self,
        workflow: &Workflow,
        instance: &WorkflowInstance,
        node: &Node,
        scope: &mut Scope,
        records: &mut Vec<InstanceNodeId>,
    ) -> Result<ActionStep, EngineError> {
        let rendered = scope.render_fields(&node.input_fields)?;
        let ctx = self.run_context(workflow, node, rendered.clone()).await?;
        let adapter = self.adapters.get(node.class.as_str())?;

        let mut record = InstanceNode::new(
            workflow.id,
            Some(instance.id),
            node.id,
            RecordSource::Execution,
        )
        .with_input(JsonValue::Object(rendered));
        if let Some(iter) = scope.iter() {
            record = record.with_iteration(iter.loop_iteration as u32);
        }

        match adapter.run(ctx).await {
            Ok(output) => {
                let record = record.with_output(output.clone());
                records.push(self.instances.record_node(record).await?);
                scope.record_output(node.id, output);
                Ok(ActionStep::Advance(node.transition))
            }
            Err(err) => {
                let reason = err.to_string();
                let record = record.failed(json!({"error": reason.clone()}));
                records.push(self.instances.record_node(record).await?);
                Ok(ActionStep::Failed { reason })
            }
        }
    }

    /// Evaluates a switch node's paths in declared order.
    ///
    /// The first matching path wins; with no match the default path is
    /// taken; with no match and no default the chain simply ends here — the
    /// recorded output carries every path's boolean result.
    async fn run_switch(
        &self,
        workflow: &Workflow,
        instance: &WorkflowInstance,
        node: &Node,
        scope: &mut Scope,
        records: &mut Vec<InstanceNodeId>,
    ) -> Result<Option<NodeId>, EngineError> {
        let config: SwitchConfig = node.switch_config()?;

        let mut results = vec![false; config.paths.len()];
        let mut selected = None;
        for (index, path) in config.paths.iter().enumerate() {
            if path.conditions.is_empty() {
                continue;
            }
            let mut matched = true;
            for condition in &path.conditions {
                if !scope.evaluate_condition(condition)? {
                    matched = false;
                    break;
                }
            }
            if matched {
                results[index] = true;
                selected = Some(index);
                break;
            }
        }
        if selected.is_none()
            && let Some(index) = config.paths.iter().position(|p| p.is_default)
        {
            results[index] = true;
            selected = Some(index);
        }

        let output = json!({
            "paths": config
                .paths
                .iter()
                .zip(&results)
                .map(|(path, result)| {
                    json!({"name": path.name, "execution_result": result})
                })
                .collect::<Vec<_>>(),
        });

        let mut record = InstanceNode::new(
            workflow.id,
            Some(instance.id),
            node.id,
            RecordSource::Execution,
        )
        .with_input(JsonValue::Object(node.input_fields.clone()))
        .with_output(output.clone());
        if let Some(iter) = scope.iter() {
            record = record.with_iteration(iter.loop_iteration as u32);
        }
        records.push(self.instances.record_node(record).await?);
        scope.record_output(node.id, output);

        Ok(selected.and_then(|index| config.paths[index].transition))
    }

    /// Iterates a foreach node's body strictly sequentially.
    async fn run_foreach(
        &self,
        workflow: &Workflow,
        instance: &WorkflowInstance,
        node: &Node,
        scope: &mut Scope,
        steps: &mut usize,
        records: &mut Vec<InstanceNodeId>,
    ) -> Result<ChainStep, EngineError> {
        let config = node.foreach_config()?;
        let collection = scope.render_template(&config.input_collection)?;

        let Some(items) = collection.as_array().cloned() else {
            let record = InstanceNode::new(
                workflow.id,
                Some(instance.id),
                node.id,
                RecordSource::Execution,
            )
            .with_input(json!({"input_collection": config.input_collection}))
            .failed(json!({"error": "input collection did not resolve to an array"}));
            records.push(self.instances.record_node(record).await?);
            return Ok(ChainStep::Stop(ChainOutcome::Failed {
                node_id: node.id,
                reason: "input collection did not resolve to an array".to_string(),
            }));
        };

        let total = items.len();
        let output = json!({"total_iterations": total});
        let record = InstanceNode::new(
            workflow.id,
            Some(instance.id),
            node.id,
            RecordSource::Execution,
        )
        .with_input(json!({"input_collection": config.input_collection}))
        .with_output(output.clone());
        records.push(self.instances.record_node(record).await?);
        scope.record_output(node.id, output);

        if let Some(body) = config.transition {
            // Save any enclosing iteration scope; the body sees only its own.
            let enclosing = scope.take_iter();
            for (index, item) in items.into_iter().enumerate() {
                scope.set_iter(IterScope {
                    loop_item: item,
                    loop_iteration: index,
                    loop_total_iterations: total,
                });
                let outcome = self
                    .run_chain_boxed(workflow, instance, body, scope, steps, records)
                    .await?;
                if outcome != ChainOutcome::Completed {
                    scope.restore_iter(enclosing);
                    return Ok(ChainStep::Stop(outcome));
                }
            }
            scope.restore_iter(enclosing);
        }

        Ok(ChainStep::Continue(node.transition))
    }

    /// Builds the adapter run context, resolving the node's authorizer.
    async fn run_context(
        &self,
        workflow: &Workflow,
        node: &Node,
        input: serde_json::Map<String, JsonValue>,
    ) -> Result<RunContext, EngineError> {
        let authorizer = match (node.credential_id, &self.resolver) {
            (Some(credential_id), Some(resolver)) => {
                Some(Arc::new(resolver.resolve(credential_id).await?))
            }
            _ => None,
        };
        Ok(RunContext {
            workflow_id: workflow.id,
            node_id: node.id,
            input,
            authorizer,
        })
    }

    /// Boxed indirection so foreach bodies can recurse into `run_chain`.
    fn run_chain_boxed<'a>(
        &'a self,
        workflow: &'a Workflow,
        instance: &'a WorkflowInstance,
        head: NodeId,
        scope: &'a mut Scope,
        steps: &'a mut usize,
        records: &'a mut Vec<InstanceNodeId>,
    ) -> Pin<Box<dyn Future<Output = Result<ChainOutcome, EngineError>> + Send + 'a>> {
        Box::pin(self.run_chain(workflow, instance, head, scope, steps, records))
    }
}

/// Control flow for the chain walk after an action node.
enum ActionStep {
    /// Advance to the next cursor.
    Advance(Option<NodeId>),
    /// The adapter failed; stop the chain.
    Failed { reason: String },
}

/// Control flow for the chain walk after a foreach node.
enum ChainStep {
    /// Continue to the next cursor.
    Continue(Option<NodeId>),
    /// Stop the chain with the given outcome.
    Stop(ChainOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Adapter;
    use crate::confirm::{
        ConfirmDecision, ConfirmManager, MemoryConfirmStore, MemoryWorkQueue, WorkQueue,
    };
    use crate::error::AdapterError;
    use crate::instance::{MemoryInstanceStore, NodeRunStatus};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    /// Echoes its rendered input as output.
    struct EchoAdapter;

    #[async_trait]
    impl Adapter for EchoAdapter {
        fn class(&self) -> &str {
            "echo"
        }

        async fn run(&self, ctx: RunContext) -> Result<JsonValue, AdapterError> {
            Ok(JsonValue::Object(ctx.input))
        }
    }

    /// Fails every invocation.
    struct FailingAdapter;

    #[async_trait]
    impl Adapter for FailingAdapter {
        fn class(&self) -> &str {
            "failing"
        }

        async fn run(&self, _ctx: RunContext) -> Result<JsonValue, AdapterError> {
            Err(AdapterError::Failed {
                reason: "remote rejected".to_string(),
            })
        }
    }

    /// Records every rendered input it receives.
    #[derive(Default)]
    struct RecordingAdapter {
        seen: Mutex<Vec<Map<String, JsonValue>>>,
    }

    #[async_trait]
    impl Adapter for RecordingAdapter {
        fn class(&self) -> &str {
            "recording"
        }

        async fn run(&self, ctx: RunContext) -> Result<JsonValue, AdapterError> {
            self.seen.lock().expect("seen lock").push(ctx.input.clone());
            Ok(JsonValue::Object(ctx.input))
        }
    }

    struct SleepyAdapter;

    #[async_trait]
    impl Adapter for SleepyAdapter {
        fn class(&self) -> &str {
            "sleepy"
        }

        async fn run(&self, _ctx: RunContext) -> Result<JsonValue, AdapterError> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(JsonValue::Null)
        }
    }

    struct Harness {
        executor: Executor,
        instances: Arc<MemoryInstanceStore>,
        confirms: Arc<MemoryConfirmStore>,
        recording: Arc<RecordingAdapter>,
    }

    fn harness() -> Harness {
        harness_with_settings(EngineSettings::default())
    }

    fn harness_with_settings(settings: EngineSettings) -> Harness {
        let mut registry = AdapterRegistry::new();
        let recording = Arc::new(RecordingAdapter::default());
        registry.register(Arc::new(EchoAdapter)).expect("register");
        registry
            .register(Arc::new(FailingAdapter))
            .expect("register");
        registry.register(Arc::new(SleepyAdapter)).expect("register");
        registry
            .register(Arc::clone(&recording) as Arc<dyn Adapter>)
            .expect("register");

        let instances = Arc::new(MemoryInstanceStore::new());
        let confirms = Arc::new(MemoryConfirmStore::new());
        let executor = Executor::new(
            Arc::new(registry),
            Arc::clone(&instances) as Arc<dyn InstanceStore>,
            Arc::clone(&confirms) as Arc<dyn ConfirmStore>,
            settings,
        );
        Harness {
            executor,
            instances,
            confirms,
            recording,
        }
    }

    fn fields(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn linear_chain_threads_outputs_downstream() {
        let h = harness();
        let mut workflow = Workflow::new("linear");

        let first = Node::new("first", "echo")
            .with_input_fields(fields(json!({"value": "{{ input.seed }}"})));
        let first_id = first.id;
        let second = Node::new("second", "echo").with_input_fields(fields(json!({
            "carried": format!("{{{{ node.{first_id}.output.value }}}}")
        })));
        let second_id = second.id;

        workflow.graph.add_node(first).unwrap();
        workflow.graph.add_node(second).unwrap();
        workflow.graph.set_transition(first_id, Some(second_id)).unwrap();
        workflow.graph.set_start(first_id).unwrap();

        let outcome = h
            .executor
            .execute(&workflow, first_id, json!({"seed": 42}), None)
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Passed);
        assert_eq!(outcome.records.len(), 2);

        let records = h.instances.all_records();
        assert_eq!(records[1].node_id, second_id);
        assert_eq!(records[1].output["carried"], json!(42));
    }

    #[tokio::test]
    async fn switch_takes_first_matching_path() {
        let h = harness();
        let mut workflow = Workflow::new("branching");

        let high = Node::new("high", "echo")
            .with_input_fields(fields(json!({"branch": "high"})));
        let low = Node::new("low", "echo").with_input_fields(fields(json!({"branch": "low"})));
        let high_id = high.id;
        let low_id = low.id;

        let switch = Node::new("route", "switch").with_input_fields(fields(json!({
            "paths": [
                {
                    "name": "high",
                    "conditions": [
                        {"left": "input.score", "operator": "greater_than", "right": 5}
                    ],
                    "transition": high_id
                },
                {
                    "name": "also-high",
                    "conditions": [
                        {"left": "input.score", "operator": "greater_than", "right": 0}
                    ],
                    "transition": low_id
                },
                {"name": "fallback", "is_default": true, "transition": low_id}
            ]
        })));
        let switch_id = switch.id;

        workflow.graph.add_node(high).unwrap();
        workflow.graph.add_node(low).unwrap();
        workflow.graph.add_node(switch).unwrap();
        workflow.graph.set_start(switch_id).unwrap();

        let outcome = h
            .executor
            .execute(&workflow, switch_id, json!({"score": 9}), None)
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Passed);

        let records = h.instances.all_records();
        let switch_record = &records[0];
        let paths = switch_record.output["paths"].as_array().unwrap();
        let true_count = paths
            .iter()
            .filter(|p| p["execution_result"] == json!(true))
            .count();
        // First match wins even though the second path would also match.
        assert_eq!(true_count, 1);
        assert_eq!(paths[0]["execution_result"], json!(true));

        // The high branch executed; the low branch did not.
        assert!(records.iter().any(|r| r.node_id == high_id));
        assert!(!records.iter().any(|r| r.node_id == low_id));
    }

    #[tokio::test]
    async fn switch_without_match_or_default_terminates_cleanly() {
        let h = harness();
        let mut workflow = Workflow::new("no-match");

        let unreachable =
            Node::new("after", "echo").with_input_fields(fields(json!({"x": 1})));
        let unreachable_id = unreachable.id;
        let switch = Node::new("route", "switch").with_input_fields(fields(json!({
            "paths": [
                {
                    "name": "only",
                    "conditions": [
                        {"left": "input.kind", "operator": "equals", "right": "never"}
                    ],
                    "transition": unreachable_id
                }
            ]
        })));
        let switch_id = switch.id;

        workflow.graph.add_node(unreachable).unwrap();
        workflow.graph.add_node(switch).unwrap();
        workflow.graph.set_start(switch_id).unwrap();

        let outcome = h
            .executor
            .execute(&workflow, switch_id, json!({"kind": "other"}), None)
            .await
            .expect("execute");

        // Not an error: the chain ends at the switch with every result false.
        assert_eq!(outcome.instance.status, InstanceStatus::Passed);
        let records = h.instances.all_records();
        assert_eq!(records.len(), 1);
        let paths = records[0].output["paths"].as_array().unwrap();
        assert!(paths.iter().all(|p| p["execution_result"] == json!(false)));
    }

    #[tokio::test]
    async fn foreach_runs_body_once_per_item_in_order() {
        let h = harness();
        let mut workflow = Workflow::new("looping");

        let body = Node::new("body", "recording").with_input_fields(fields(json!({
            "item": "{{ iter.loop_item }}",
            "index": "{{ iter.loop_iteration }}",
            "is_last": "{{ iter.loop_iteration_is_last }}",
            "total": "{{ iter.loop_total_iterations }}"
        })));
        let body_id = body.id;

        let foreach = Node::new("loop", "foreach").with_input_fields(fields(json!({
            "input_collection": "{{ input.items }}",
            "transition": body_id
        })));
        let foreach_id = foreach.id;

        workflow.graph.add_node(body).unwrap();
        workflow.graph.add_node(foreach).unwrap();
        workflow.graph.set_start(foreach_id).unwrap();

        let outcome = h
            .executor
            .execute(
                &workflow,
                foreach_id,
                json!({"items": ["a", "b", "c"]}),
                None,
            )
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Passed);

        // Exactly N iteration-indexed body records, in order.
        let records = h.instances.all_records();
        let body_records: Vec<_> = records.iter().filter(|r| r.node_id == body_id).collect();
        assert_eq!(body_records.len(), 3);
        for (index, record) in body_records.iter().enumerate() {
            assert_eq!(record.iteration, Some(index as u32));
            assert_eq!(record.output["index"], json!(index));
            assert_eq!(record.output["total"], json!(3));
            assert_eq!(
                record.output["is_last"],
                json!(index == 2),
                "is_last wrong at index {index}"
            );
        }

        // The adapter observed the items strictly in collection order.
        let seen = h.recording.seen.lock().expect("seen lock");
        let observed: Vec<_> = seen.iter().map(|m| m["item"].clone()).collect();
        assert_eq!(observed, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn iter_scope_does_not_leak_past_loop() {
        let h = harness();
        let mut workflow = Workflow::new("scoping");

        let body = Node::new("body", "echo")
            .with_input_fields(fields(json!({"item": "{{ iter.loop_item }}"})));
        let body_id = body.id;
        let after = Node::new("after", "echo")
            .with_input_fields(fields(json!({"leaked": "{{ iter.loop_item }}"})));
        let after_id = after.id;

        let mut foreach = Node::new("loop", "foreach").with_input_fields(fields(json!({
            "input_collection": "{{ input.items }}",
            "transition": body_id
        })));
        foreach.transition = Some(after_id);
        let foreach_id = foreach.id;

        workflow.graph.add_node(body).unwrap();
        workflow.graph.add_node(after).unwrap();
        workflow.graph.add_node(foreach).unwrap();
        workflow.graph.set_start(foreach_id).unwrap();

        h.executor
            .execute(&workflow, foreach_id, json!({"items": [1]}), None)
            .await
            .expect("execute");

        let records = h.instances.all_records();
        let after_record = records.iter().find(|r| r.node_id == after_id).unwrap();
        // The scratch scope was discarded at the loop boundary.
        assert_eq!(after_record.output["leaked"], JsonValue::Null);
        assert_eq!(after_record.iteration, None);
    }

    #[tokio::test]
    async fn foreach_over_non_array_fails_at_the_node() {
        let h = harness();
        let mut workflow = Workflow::new("bad-collection");

        let foreach = Node::new("loop", "foreach").with_input_fields(fields(json!({
            "input_collection": "{{ input.not_a_list }}"
        })));
        let foreach_id = foreach.id;
        workflow.graph.add_node(foreach).unwrap();
        workflow.graph.set_start(foreach_id).unwrap();

        let outcome = h
            .executor
            .execute(&workflow, foreach_id, json!({"not_a_list": 7}), None)
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Failed);
        assert_eq!(outcome.instance.failed_node, Some(foreach_id));
    }

    #[tokio::test]
    async fn failing_node_aborts_chain_and_keeps_partial_records() {
        let h = harness();
        let mut workflow = Workflow::new("failing");

        let first = Node::new("first", "echo").with_input_fields(fields(json!({"ok": true})));
        let first_id = first.id;
        let failing = Node::new("boom", "failing");
        let failing_id = failing.id;
        let never = Node::new("never", "echo");
        let never_id = never.id;

        workflow.graph.add_node(first).unwrap();
        workflow.graph.add_node(failing).unwrap();
        workflow.graph.add_node(never).unwrap();
        workflow.graph.set_transition(first_id, Some(failing_id)).unwrap();
        workflow.graph.set_transition(failing_id, Some(never_id)).unwrap();
        workflow.graph.set_start(first_id).unwrap();

        let outcome = h
            .executor
            .execute(&workflow, first_id, JsonValue::Null, None)
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Failed);
        assert_eq!(outcome.instance.failed_node, Some(failing_id));

        let records = h.instances.all_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, NodeRunStatus::Passed);
        assert_eq!(records[1].status, NodeRunStatus::Failed);
        assert!(!records.iter().any(|r| r.node_id == never_id));
    }

    #[tokio::test]
    async fn step_budget_stops_runaway_graphs() {
        let h = harness_with_settings(EngineSettings {
            step_budget: 10,
            ..EngineSettings::default()
        });
        let mut workflow = Workflow::new("cyclic");

        let a = Node::new("a", "echo");
        let b = Node::new("b", "echo");
        let a_id = a.id;
        let b_id = b.id;
        workflow.graph.add_node(a).unwrap();
        workflow.graph.add_node(b).unwrap();
        workflow.graph.set_transition(a_id, Some(b_id)).unwrap();
        workflow.graph.set_transition(b_id, Some(a_id)).unwrap();
        workflow.graph.set_start(a_id).unwrap();

        let result = h
            .executor
            .execute(&workflow, a_id, JsonValue::Null, None)
            .await;

        assert!(matches!(
            result,
            Err(EngineError::StepBudgetExceeded { budget: 10 })
        ));
    }

    #[tokio::test]
    async fn confirm_suspends_and_resumes_after_approval() {
        let h = harness();
        let mut workflow = Workflow::new("approval");

        let before = Node::new("before", "echo")
            .with_input_fields(fields(json!({"stage": "before"})));
        let before_id = before.id;
        let confirm = Node::new("approve", "confirm");
        let confirm_node_id = confirm.id;
        let after = Node::new("after", "echo").with_input_fields(fields(json!({
            "carried": format!("{{{{ node.{before_id}.output.stage }}}}")
        })));
        let after_id = after.id;

        workflow.graph.add_node(before).unwrap();
        workflow.graph.add_node(confirm).unwrap();
        workflow.graph.add_node(after).unwrap();
        workflow
            .graph
            .set_transition(before_id, Some(confirm_node_id))
            .unwrap();
        workflow
            .graph
            .set_transition(confirm_node_id, Some(after_id))
            .unwrap();
        workflow.graph.set_start(before_id).unwrap();

        let outcome = h
            .executor
            .execute(&workflow, before_id, JsonValue::Null, None)
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Suspended);
        let confirm_id = outcome.confirm_id.expect("confirm id");

        // The post-confirm node was not executed.
        let records = h.instances.all_records();
        assert!(!records.iter().any(|r| r.node_id == after_id));

        // Approve and resume from the enqueued unit of work.
        let queue = Arc::new(MemoryWorkQueue::new());
        let manager = ConfirmManager::new(
            Arc::clone(&h.confirms) as Arc<dyn ConfirmStore>,
            Arc::clone(&h.instances) as Arc<dyn InstanceStore>,
            Arc::clone(&queue) as Arc<dyn WorkQueue>,
        );
        manager
            .decide(confirm_id, ConfirmDecision::Approved)
            .await
            .expect("decide");

        let mut units = queue.drain();
        assert_eq!(units.len(), 1);
        let unit = units.remove(0);
        assert_eq!(unit.start_node, after_id);

        let resumed = h.executor.resume(&workflow, unit).await.expect("resume");
        assert_eq!(resumed.instance.status, InstanceStatus::Passed);

        // The resumed chain still sees pre-suspension outputs.
        let records = h.instances.all_records();
        let after_record = records.iter().find(|r| r.node_id == after_id).unwrap();
        assert_eq!(after_record.output["carried"], json!("before"));
    }

    /// Returns the access token of the node's credential.
    struct TokenProbeAdapter;

    #[async_trait]
    impl Adapter for TokenProbeAdapter {
        fn class(&self) -> &str {
            "token_probe"
        }

        async fn run(&self, ctx: RunContext) -> Result<JsonValue, AdapterError> {
            let authorizer = ctx.authorizer.ok_or(AdapterError::Failed {
                reason: "no authorizer".to_string(),
            })?;
            let token = authorizer
                .access_token()
                .await
                .map_err(|e| AdapterError::Failed {
                    reason: e.to_string(),
                })?;
            Ok(json!({"token": token}))
        }
    }

    #[tokio::test]
    async fn credential_bearing_node_gets_an_authorizer() {
        use flywheel_auth::{
            AuthorizerContext, AuthorizerFactory, Credential, CredentialKind, CredentialOwner,
            CredentialStore, MemoryCredentialStore, PassthroughCipher, seal_json,
        };
        use flywheel_core::UserId;

        let credentials = Arc::new(MemoryCredentialStore::new());
        let credential = Credential::new(
            CredentialOwner::User {
                user_id: UserId::new(),
            },
            "api token",
            CredentialKind::AccessToken,
            seal_json(&PassthroughCipher, &json!({"token": "tok_live"})).expect("seal"),
        );
        let credential_id = credentials.store(credential).await.expect("store");
        let resolver = Arc::new(AuthorizerFactory::new(
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            AuthorizerContext::new(Arc::new(PassthroughCipher)),
        ));

        let mut registry = AdapterRegistry::new();
        registry
            .register(Arc::new(TokenProbeAdapter))
            .expect("register");
        let instances = Arc::new(MemoryInstanceStore::new());
        let confirms = Arc::new(MemoryConfirmStore::new());
        let executor = Executor::new(
            Arc::new(registry),
            Arc::clone(&instances) as Arc<dyn InstanceStore>,
            confirms,
            EngineSettings::default(),
        )
        .with_resolver(resolver);

        let mut workflow = Workflow::new("authorized");
        let node = Node::new("probe", "token_probe").with_credential(credential_id);
        let node_id = node.id;
        workflow.graph.add_node(node).unwrap();
        workflow.graph.set_start(node_id).unwrap();

        let outcome = executor
            .execute(&workflow, node_id, JsonValue::Null, None)
            .await
            .expect("execute");

        assert_eq!(outcome.instance.status, InstanceStatus::Passed);
        let records = instances.all_records();
        assert_eq!(records[0].output["token"], json!("tok_live"));
    }

    #[tokio::test]
    async fn test_node_records_manual_sample() {
        let h = harness();
        let mut workflow = Workflow::new("manual");

        let node = Node::new("fetch", "echo")
            .with_input_fields(fields(json!({"value": "{{ input.v }}"})));
        let node_id = node.id;
        workflow.graph.add_node(node).unwrap();

        let scope = Scope::new(json!({"v": "sample"}));
        let record = h
            .executor
            .test_node(&workflow, node_id, &scope)
            .await
            .expect("test");

        assert_eq!(record.source, RecordSource::ManualTest);
        assert_eq!(record.status, NodeRunStatus::Passed);
        assert_eq!(record.output["value"], json!("sample"));
        assert!(record.instance_id.is_none());
    }

    #[tokio::test]
    async fn test_node_times_out() {
        let h = harness_with_settings(EngineSettings {
            manual_run_timeout_seconds: 0,
            ..EngineSettings::default()
        });
        let mut workflow = Workflow::new("slow");

        let node = Node::new("slow", "sleepy");
        let node_id = node.id;
        workflow.graph.add_node(node).unwrap();

        let result = h
            .executor
            .test_node(&workflow, node_id, &Scope::new(JsonValue::Null))
            .await;

        assert!(matches!(result, Err(EngineError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_node_rejects_control_nodes() {
        let h = harness();
        let mut workflow = Workflow::new("control");

        let switch = Node::new("route", "switch")
            .with_input_fields(fields(json!({"paths": []})));
        let switch_id = switch.id;
        workflow.graph.add_node(switch).unwrap();

        let result = h
            .executor
            .test_node(&workflow, switch_id, &Scope::new(JsonValue::Null))
            .await;

        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::InvalidConfig { .. }))
        ));
    }
}
