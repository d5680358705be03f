//! Live execution state tracker.
//!
//! Thread-safe snapshot of which nodes are executing, what has completed,
//! and how many runners are active. Readers get a deep snapshot with live
//! durations computed on read; the in-memory tracker is authoritative and
//! the cache projection (see `snapshot`) is derived from it.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
struct ExecutingNode {
    node_type: String,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CompletedNode {
    node_id: String,
    node_type: String,
    completed_at: DateTime<Utc>,
    duration_seconds: f64,
    route: Option<String>,
}

#[derive(Debug, Default)]
struct StateInner {
    status: Option<WorkflowStatus>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    executing: BTreeMap<String, ExecutingNode>,
    completed: Vec<CompletedNode>,
    active_runners: i64,
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Snapshot shapes (the cross-process state document)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutingNodeSnapshot {
    pub node_type: String,
    pub started_at: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedNodeSnapshot {
    pub node_id: String,
    pub node_type: String,
    pub completed_at: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

/// Complete execution state for observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullState {
    pub workflow_id: Option<String>,
    pub status: WorkflowStatus,
    pub total_nodes: usize,
    pub active_runners: i64,
    pub executing_nodes: BTreeMap<String, ExecutingNodeSnapshot>,
    pub completed_nodes: Vec<CompletedNodeSnapshot>,
    pub completed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Tracks real-time execution state for one workflow. All mutations and
/// reads serialize under a single lock, so every snapshot is consistent.
pub struct ExecutionStateTracker {
    workflow_id: Option<String>,
    total_nodes: usize,
    inner: Mutex<StateInner>,
}

impl ExecutionStateTracker {
    pub fn new(workflow_id: Option<String>, total_nodes: usize) -> Self {
        Self {
            workflow_id,
            total_nodes,
            inner: Mutex::new(StateInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateInner> {
        self.inner.lock().expect("state tracker lock poisoned")
    }

    /// Flip to running and clear all per-run state.
    pub fn start_workflow(&self) {
        let mut inner = self.lock();
        *inner = StateInner {
            status: Some(WorkflowStatus::Running),
            started_at: Some(Utc::now()),
            ..StateInner::default()
        };
        info!(workflow_id = ?self.workflow_id, "workflow execution started");
    }

    pub fn register_runner(&self) {
        self.lock().active_runners += 1;
    }

    /// Unregister a runner; the workflow completes when the count reaches
    /// zero while still running.
    pub fn unregister_runner(&self) {
        let mut inner = self.lock();
        inner.active_runners -= 1;
        if inner.active_runners <= 0 && inner.status == Some(WorkflowStatus::Running) {
            inner.status = Some(WorkflowStatus::Completed);
            inner.completed_at = Some(Utc::now());
            info!(workflow_id = ?self.workflow_id, "workflow execution completed");
        }
    }

    pub fn on_node_started(&self, node_id: &str, node_type: &str) {
        let mut inner = self.lock();
        inner.executing.insert(
            node_id.to_owned(),
            ExecutingNode {
                node_type: node_type.to_owned(),
                started_at: Utc::now(),
            },
        );
        debug!(node_id, node_type, "node started");
    }

    /// Returns the measured duration in seconds.
    pub fn on_node_completed(&self, node_id: &str, node_type: &str, route: Option<&str>) -> f64 {
        let mut inner = self.lock();
        let completed_at = Utc::now();
        let duration_seconds = inner
            .executing
            .remove(node_id)
            .map(|info| duration_between(info.started_at, completed_at))
            .unwrap_or(0.0);

        inner.completed.push(CompletedNode {
            node_id: node_id.to_owned(),
            node_type: node_type.to_owned(),
            completed_at,
            duration_seconds,
            route: route.map(str::to_owned),
        });
        debug!(node_id, duration_seconds, ?route, "node completed");
        duration_seconds
    }

    pub fn on_node_failed(&self, node_id: &str, node_type: &str, error_message: &str) {
        let mut inner = self.lock();
        inner.executing.remove(node_id);
        inner.error = Some(error_message.to_owned());
        error!(node_id, node_type, error = error_message, "node failed");
    }

    pub fn on_workflow_failed(&self, error_message: &str) {
        let mut inner = self.lock();
        inner.status = Some(WorkflowStatus::Failed);
        inner.completed_at = Some(Utc::now());
        inner.executing.clear();
        inner.error = Some(error_message.to_owned());
        error!(workflow_id = ?self.workflow_id, error = error_message, "workflow failed");
    }

    pub fn status(&self) -> WorkflowStatus {
        self.lock().status.unwrap_or(WorkflowStatus::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.status() == WorkflowStatus::Running
    }

    /// Deep snapshot with live durations computed at read time.
    pub fn full_state(&self) -> FullState {
        let inner = self.lock();
        let now = Utc::now();

        let executing_nodes = inner
            .executing
            .iter()
            .map(|(node_id, info)| {
                (
                    node_id.clone(),
                    ExecutingNodeSnapshot {
                        node_type: info.node_type.clone(),
                        started_at: info.started_at.to_rfc3339(),
                        duration_seconds: duration_between(info.started_at, now),
                    },
                )
            })
            .collect();

        let completed_nodes: Vec<CompletedNodeSnapshot> = inner
            .completed
            .iter()
            .map(|info| CompletedNodeSnapshot {
                node_id: info.node_id.clone(),
                node_type: info.node_type.clone(),
                completed_at: info.completed_at.to_rfc3339(),
                duration_seconds: info.duration_seconds,
                route: info.route.clone(),
            })
            .collect();

        FullState {
            workflow_id: self.workflow_id.clone(),
            status: inner.status.unwrap_or(WorkflowStatus::Idle),
            total_nodes: self.total_nodes,
            active_runners: inner.active_runners,
            completed_count: completed_nodes.len(),
            executing_nodes,
            completed_nodes,
            started_at: inner.started_at.map(|at| at.to_rfc3339()),
            completed_at: inner.completed_at.map(|at| at.to_rfc3339()),
            total_duration_seconds: inner
                .started_at
                .map(|start| duration_between(start, inner.completed_at.unwrap_or(now))),
            error: inner.error.clone(),
        }
    }
}

fn duration_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ExecutionStateTracker {
        ExecutionStateTracker::new(Some("wf-1".to_owned()), 3)
    }

    #[test]
    fn starts_idle_and_flips_to_running() {
        let t = tracker();
        assert_eq!(t.status(), WorkflowStatus::Idle);
        t.start_workflow();
        assert!(t.is_running());
        let state = t.full_state();
        assert!(state.executing_nodes.is_empty());
        assert!(state.completed_nodes.is_empty());
        assert!(state.started_at.is_some());
    }

    #[test]
    fn completes_when_last_runner_unregisters() {
        let t = tracker();
        t.start_workflow();
        t.register_runner();
        t.register_runner();

        t.unregister_runner();
        assert!(t.is_running());
        t.unregister_runner();
        assert_eq!(t.status(), WorkflowStatus::Completed);
        assert!(t.full_state().completed_at.is_some());
    }

    #[test]
    fn node_lifecycle_moves_from_executing_to_completed() {
        let t = tracker();
        t.start_workflow();

        t.on_node_started("n1", "counter");
        assert!(t.full_state().executing_nodes.contains_key("n1"));

        t.on_node_completed("n1", "counter", Some("yes"));
        let state = t.full_state();
        assert!(state.executing_nodes.is_empty());
        assert_eq!(state.completed_count, 1);
        assert_eq!(state.completed_nodes[0].route.as_deref(), Some("yes"));
    }

    #[test]
    fn failure_clears_executing_and_records_error() {
        let t = tracker();
        t.start_workflow();
        t.on_node_started("n1", "counter");
        t.on_node_failed("n1", "counter", "boom");

        let state = t.full_state();
        assert!(state.executing_nodes.is_empty());
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn workflow_failure_empties_executing_nodes() {
        let t = tracker();
        t.start_workflow();
        t.on_node_started("n1", "counter");
        t.on_workflow_failed("fatal");

        let state = t.full_state();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(state.executing_nodes.is_empty());
        assert_eq!(state.error.as_deref(), Some("fatal"));
    }

    #[test]
    fn full_state_round_trips_as_json() {
        let t = tracker();
        t.start_workflow();
        t.on_node_started("n1", "counter");
        t.on_node_completed("n1", "counter", None);

        let serialized = serde_json::to_value(t.full_state()).unwrap();
        let restored: FullState = serde_json::from_value(serialized).unwrap();
        assert_eq!(restored.completed_count, 1);
        assert_eq!(restored.status, WorkflowStatus::Running);
    }
}
