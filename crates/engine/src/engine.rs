//! `FlowEngine` — central coordination of graph loading and execution.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use nodes::payload::meta;
use nodes::{DataMap, NodeConfig, NodeKind, NodeOutput, NodeRegistry, WorkflowKind};
use serde_json::{json, Value};
use storage::DataStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::FlowAnalyzer;
use crate::builder::{FlowBuilder, WorkflowDefinition};
use crate::error::EngineError;
use crate::events::{EventEmitter, EventKind, ExecutionStateTracker, FullState};
use crate::execution::api_runner::ApiFlowRunner;
use crate::execution::context::{ExecContext, SharedRuntime};
use crate::execution::pool::PoolExecutor;
use crate::execution::runner::FlowRunner;
use crate::execution::subdag::{
    iteration_payload, iteration_result_entry, run_subdag_once, FOR_EACH_KEY, SUBDAG_KEY,
};
use crate::graph::FlowGraph;
use crate::postprocess::standard_passes;
use crate::session::NodeSessionStore;
use crate::snapshot::spawn_snapshot_writer;

const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of one iterate-and-stop call on a loop node.
#[derive(Debug)]
pub struct IterationOutcome {
    /// The updated `forEachNode` summary (input, results, state).
    pub for_each: Value,
    /// The terminal outputs of this iteration's sub-DAG pass.
    pub iteration_output: Vec<DataMap>,
    /// The input data with the summary attached, for persistence.
    pub output_data: DataMap,
}

pub struct FlowEngine {
    workflow_id: Option<String>,
    registry: NodeRegistry,
    data_store: DataStore,
    events: EventEmitter,
    runtime: SharedRuntime,
    executor: Arc<PoolExecutor>,
    sessions: NodeSessionStore,
    graph: Option<Arc<FlowGraph>>,
    runners: Vec<Arc<FlowRunner>>,
    tracker: Option<Arc<ExecutionStateTracker>>,
    snapshot_tx: Option<mpsc::UnboundedSender<()>>,
    snapshot_task: Option<JoinHandle<()>>,
    runner_aborts: Mutex<Vec<tokio::task::AbortHandle>>,
}

impl FlowEngine {
    pub fn new(workflow_id: Option<String>) -> Self {
        Self::with_parts(workflow_id, NodeRegistry::builtin(), DataStore::shared())
    }

    pub fn with_parts(
        workflow_id: Option<String>,
        registry: NodeRegistry,
        data_store: DataStore,
    ) -> Self {
        let events = EventEmitter::new(workflow_id.clone());
        Self {
            workflow_id,
            registry,
            data_store,
            events,
            runtime: Arc::new(Mutex::new(DataMap::new())),
            executor: Arc::new(PoolExecutor::new()),
            sessions: NodeSessionStore::new(),
            graph: None,
            runners: Vec::new(),
            tracker: None,
            snapshot_tx: None,
            snapshot_task: None,
            runner_aborts: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn data_store(&self) -> &DataStore {
        &self.data_store
    }

    pub fn graph(&self) -> Option<&Arc<FlowGraph>> {
        self.graph.as_ref()
    }

    pub fn full_state(&self) -> Option<FullState> {
        self.tracker.as_ref().map(|t| t.full_state())
    }

    fn loaded_graph(&self) -> Result<&Arc<FlowGraph>, EngineError> {
        self.graph.as_ref().ok_or(EngineError::EmptyWorkflow)
    }

    fn ctx(&self) -> Result<ExecContext, EngineError> {
        Ok(ExecContext::new(
            self.loaded_graph()?.clone(),
            self.executor.clone(),
            self.events.clone(),
            self.runtime.clone(),
        ))
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Build the graph from JSON, run the post-processors, and create one
    /// runner per producer.
    ///
    /// With `scope_node_id` set, only that node and the nodes reachable
    /// from it are validated (used for sub-DAG iteration runs); other
    /// nodes are skipped entirely.
    pub fn load_workflow(
        &mut self,
        definition: WorkflowDefinition,
        scope_node_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let graph = FlowBuilder::new(&self.registry).build(definition)?;

        let scope: Option<HashSet<String>> = scope_node_id.map(|id| graph.reachable_from(id));
        for pass in standard_passes() {
            pass.run(&graph, scope.as_ref())?;
        }

        let analyzer = FlowAnalyzer::new(&graph);
        let first_node_id = analyzer.first_node_id().ok_or(EngineError::EmptyWorkflow)?;
        info!(%first_node_id, node_count = graph.len(), "workflow loaded successfully");

        let producer_ids = analyzer.producer_ids();
        let total_nodes = graph.len();
        self.graph = Some(Arc::new(graph));

        let tracker = Arc::new(ExecutionStateTracker::new(
            self.workflow_id.clone(),
            total_nodes,
        ));
        self.wire_events(tracker.clone());
        self.tracker = Some(tracker);

        self.runners.clear();
        for producer_id in producer_ids {
            let runner = FlowRunner::new(producer_id.clone(), self.ctx()?)?;
            info!(%producer_id, "created producer loop");
            self.runners.push(Arc::new(runner));
        }
        Ok(())
    }

    /// Subscribe the state tracker to node events and start the snapshot
    /// projection for observers in other processes.
    fn wire_events(&mut self, tracker: Arc<ExecutionStateTracker>) {
        {
            let tracker = tracker.clone();
            self.events.subscribe(EventKind::NodeStarted, move |event| {
                if let (Some(node_id), Some(node_type)) = (&event.node_id, &event.node_type) {
                    tracker.on_node_started(node_id, node_type);
                }
            });
        }
        {
            let tracker = tracker.clone();
            self.events.subscribe(EventKind::NodeCompleted, move |event| {
                if let (Some(node_id), Some(node_type)) = (&event.node_id, &event.node_type) {
                    tracker.on_node_completed(node_id, node_type, event.route.as_deref());
                }
            });
        }
        {
            let tracker = tracker.clone();
            self.events.subscribe(EventKind::NodeFailed, move |event| {
                if let (Some(node_id), Some(node_type)) = (&event.node_id, &event.node_type) {
                    tracker.on_node_failed(
                        node_id,
                        node_type,
                        event.error.as_deref().unwrap_or("unknown error"),
                    );
                }
            });
        }

        if let Some(workflow_id) = self.workflow_id.clone() {
            let (tx, task) = spawn_snapshot_writer(
                workflow_id,
                tracker,
                self.data_store.cache().clone(),
            );
            let ping = tx.clone();
            self.events.subscribe_all(move |_| {
                let _ = ping.send(());
            });
            self.snapshot_tx = Some(tx);
            self.snapshot_task = Some(task);
        }
    }

    // ------------------------------------------------------------------
    // Production mode
    // ------------------------------------------------------------------

    /// Run every producer loop until all complete (or are shut down).
    pub async fn run_production(&self) -> Result<(), EngineError> {
        if self.runners.is_empty() {
            info!("no flows to run");
            return Ok(());
        }
        let tracker = self.tracker.clone();
        info!(runner_count = self.runners.len(), "starting production mode");

        if let Some(tracker) = &tracker {
            tracker.start_workflow();
            for _ in &self.runners {
                tracker.register_runner();
            }
        }
        if let Some(tx) = &self.snapshot_tx {
            let _ = tx.send(());
        }

        let started = Instant::now();
        let handles: Vec<JoinHandle<Result<(), EngineError>>> = self
            .runners
            .iter()
            .map(|runner| {
                let runner = runner.clone();
                tokio::spawn(async move { runner.start().await })
            })
            .collect();
        {
            let mut aborts = self.runner_aborts.lock().expect("runner task lock poisoned");
            aborts.extend(handles.iter().map(JoinHandle::abort_handle));
        }

        let mut first_error: Option<EngineError> = None;
        for result in join_all(handles).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => first_error = first_error.or(Some(error)),
                Err(join_error) if join_error.is_cancelled() => {
                    info!("production runner cancelled");
                }
                Err(join_error) => {
                    first_error =
                        first_error.or(Some(EngineError::Node {
                            node_id: "runner".to_owned(),
                            source: nodes::NodeError::Failed(join_error.to_string()),
                        }));
                }
            }
        }

        if let Some(tracker) = &tracker {
            for _ in &self.runners {
                tracker.unregister_runner();
            }
        }

        match first_error {
            Some(error) => {
                if let Some(tracker) = &tracker {
                    tracker.on_workflow_failed(&error.to_string());
                }
                self.events.emit_workflow_failed(&error.to_string());
                Err(error)
            }
            None => {
                self.events
                    .emit_workflow_completed("success", Some(started.elapsed().as_secs_f64()));
                Ok(())
            }
        }
    }

    /// Forcefully terminate all execution loops without waiting for
    /// running tasks to complete.
    pub async fn force_shutdown(&self) {
        warn!("initiating force shutdown of all flows");
        {
            let mut aborts = self.runner_aborts.lock().expect("runner task lock poisoned");
            for handle in aborts.drain(..) {
                handle.abort();
            }
        }
        for runner in &self.runners {
            runner.shutdown(true).await;
        }
    }

    // ------------------------------------------------------------------
    // API mode
    // ------------------------------------------------------------------

    /// Execute the workflow once for a request and return the last
    /// node's output. The run is enclosed by `timeout`
    /// (default 300 s); on expiry the runner task is cancelled.
    pub async fn run_api(
        &self,
        input_data: DataMap,
        timeout: Option<Duration>,
        request_context: Option<Value>,
    ) -> Result<NodeOutput, EngineError> {
        let graph = self.loaded_graph()?;
        let first_node_id = FlowAnalyzer::new(graph)
            .first_node_id()
            .ok_or(EngineError::EmptyWorkflow)?;

        let first = graph
            .get(&first_node_id)
            .ok_or_else(|| EngineError::NodeNotFound(first_node_id.clone()))?;
        let api_capable = first.instance.kind() == NodeKind::Producer
            && first
                .instance
                .supported_workflow_types()
                .contains(&WorkflowKind::Api);
        if !api_capable {
            return Err(EngineError::InvalidApiStartNode(
                first.instance.node_type().to_owned(),
            ));
        }

        info!(workflow_id = ?self.workflow_id, %first_node_id, "starting api mode execution");

        let mut metadata = DataMap::new();
        metadata.insert(meta::API_MODE.to_owned(), json!(true));
        metadata.insert(
            meta::REQUEST_CONTEXT.to_owned(),
            request_context.unwrap_or_else(|| json!({})),
        );
        metadata.insert(
            meta::WORKFLOW_ENV.to_owned(),
            Value::Object(graph.env().clone()),
        );
        metadata.insert(
            meta::RUNTIME.to_owned(),
            Value::Object(self.runtime.lock().expect("runtime lock poisoned").clone()),
        );

        let input = NodeOutput::with_parts(Uuid::new_v4(), input_data, metadata);
        let runner = ApiFlowRunner::new(first_node_id, self.ctx()?);
        let limit = timeout.unwrap_or(DEFAULT_API_TIMEOUT);

        match tokio::time::timeout(limit, runner.run(input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(workflow_id = ?self.workflow_id, ?limit, "api execution timed out");
                Err(EngineError::Timeout(limit))
            }
        }
    }

    // ------------------------------------------------------------------
    // Dev-mode execution
    // ------------------------------------------------------------------

    /// Run a single graph node directly with the given input.
    pub async fn run_development_node(
        &self,
        node_id: &str,
        input: NodeOutput,
    ) -> Result<NodeOutput, EngineError> {
        let instance = self
            .loaded_graph()?
            .instance(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_owned()))?;
        self.executor
            .dispatch(instance, input)
            .await
            .map_err(|source| EngineError::Node {
                node_id: node_id.to_owned(),
                source,
            })
    }

    /// Run a standalone node bound to an editing session, reusing the
    /// live instance (and its state) across calls.
    pub async fn run_session_node(
        &self,
        session_id: &str,
        config: NodeConfig,
        input: NodeOutput,
    ) -> Result<NodeOutput, EngineError> {
        let node_id = config.id.clone();
        let instance = match self.sessions.get(session_id, &node_id) {
            Some(instance) => instance,
            None => {
                let instance = self.registry.create(config)?;
                instance
                    .init()
                    .await
                    .map_err(|source| EngineError::Node {
                        node_id: node_id.clone(),
                        source,
                    })?;
                self.sessions.insert(session_id, &node_id, instance.clone());
                instance
            }
        };
        self.executor
            .dispatch(instance, input)
            .await
            .map_err(|source| EngineError::Node {
                node_id,
                source,
            })
    }

    // ------------------------------------------------------------------
    // Iterate-and-stop for loop nodes
    // ------------------------------------------------------------------

    /// Run exactly one iteration of a loop node's sub-DAG.
    ///
    /// The index is the caller's, or `state.index + 1` derived from the
    /// previously persisted summary, or 0. The caller persists the
    /// returned summary and calls again for the next iteration.
    pub async fn run_loop_iteration(
        &self,
        node_id: &str,
        input_data: DataMap,
        iteration_index: Option<usize>,
        previous_summary: Option<&Value>,
    ) -> Result<IterationOutcome, EngineError> {
        let ctx = self.ctx()?;
        let flow_node = ctx.node(node_id)?;
        if flow_node.instance.kind() != NodeKind::Loop {
            return Err(EngineError::NotALoopNode(node_id.to_owned()));
        }

        let previous_results: Vec<Value> = previous_summary
            .and_then(|summary| summary.get("results"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let index = iteration_index.unwrap_or_else(|| {
            previous_summary
                .and_then(|summary| summary.get("state"))
                .and_then(|state| state.get("index"))
                .and_then(Value::as_u64)
                .map(|i| i as usize + 1)
                .unwrap_or(0)
        });

        let base = NodeOutput::new(input_data.clone());
        let resolved = ctx.run_node(flow_node, base).await?;
        let items: Vec<Value> = resolved
            .data
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if index >= items.len() {
            return Err(EngineError::IterationOutOfRange {
                index,
                len: items.len(),
            });
        }

        let entry_id = flow_node.children(SUBDAG_KEY).first().cloned();
        let (iteration_output, results) = match entry_id {
            Some(entry_id) => {
                let payload = iteration_payload(&resolved, &items, &previous_results, index);
                let collected = run_subdag_once(&ctx, entry_id, payload).await?;
                let entry = iteration_result_entry(&collected);
                let mut results = previous_results;
                results.push(entry);
                (collected.into_iter().map(|o| o.data).collect(), results)
            }
            None => (Vec::new(), previous_results),
        };

        let for_each = json!({
            "input": items,
            "results": results,
            "state": { "index": index, "item": items.get(index) },
        });
        let mut output_data = input_data;
        output_data.insert(FOR_EACH_KEY.to_owned(), for_each.clone());

        Ok(IterationOutcome {
            for_each,
            iteration_output,
            output_data,
        })
    }
}

/// Interpret an API run's final output for the HTTP layer.
///
/// The reserved `__http_response__` shape supplies status and body
/// directly; anything else is wrapped in the default success envelope.
/// Only the **last** executed node's output is consulted — a reserved
/// shape produced earlier in the flow is overwritten by whatever runs
/// after it.
pub fn api_response_parts(output: &NodeOutput) -> (u16, Value) {
    if output.is_http_response() {
        let status = output
            .data
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(200);
        let body = output.data.get("body").cloned().unwrap_or(Value::Null);
        (status, body)
    } else {
        (
            200,
            json!({ "success": true, "data": Value::Object(output.data.clone()) }),
        )
    }
}
