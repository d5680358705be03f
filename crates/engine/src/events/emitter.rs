//! Workflow event emitter.
//!
//! A per-engine bus with named events. Subscribers register callbacks per
//! event kind; `emit` invokes them synchronously in registration order.
//! A panicking subscriber is contained and logged without affecting
//! emission. The emitter prepends its workflow id to every payload.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use nodes::DataMap;
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeStarted,
    NodeCompleted,
    NodeFailed,
    WorkflowCompleted,
    WorkflowFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::NodeStarted,
        EventKind::NodeCompleted,
        EventKind::NodeFailed,
        EventKind::WorkflowCompleted,
        EventKind::WorkflowFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NodeStarted => "node_started",
            EventKind::NodeCompleted => "node_completed",
            EventKind::NodeFailed => "node_failed",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::WorkflowFailed => "workflow_failed",
        }
    }
}

/// Payload delivered to subscribers. Node-scoped events carry node id and
/// type; `node_completed` adds the output data and the route a
/// conditional chose; workflow-scoped events carry status or error.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<DataMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
}

impl WorkflowEvent {
    fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            workflow_id: None,
            node_id: None,
            node_type: None,
            output_data: None,
            route: None,
            error: None,
            status: None,
            total_duration_seconds: None,
        }
    }
}

type Callback = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

struct EmitterInner {
    workflow_id: Option<String>,
    subscribers: Mutex<HashMap<EventKind, Vec<Callback>>>,
}

/// Cheaply clonable handle to the per-engine event bus.
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<EmitterInner>,
}

impl EventEmitter {
    pub fn new(workflow_id: Option<String>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                workflow_id,
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        let mut subscribers = self.inner.subscribers.lock().expect("emitter lock poisoned");
        subscribers.entry(kind).or_default().push(Arc::new(callback));
        debug!(event = kind.as_str(), "event subscriber added");
    }

    /// Subscribe one callback to every event kind.
    pub fn subscribe_all<F>(&self, callback: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        let shared: Callback = Arc::new(callback);
        let mut subscribers = self.inner.subscribers.lock().expect("emitter lock poisoned");
        for kind in EventKind::ALL {
            subscribers.entry(kind).or_default().push(shared.clone());
        }
    }

    pub fn emit(&self, mut event: WorkflowEvent) {
        event.workflow_id = self.inner.workflow_id.clone();

        // Clone the list out so subscribers may themselves subscribe.
        let callbacks: Vec<Callback> = {
            let subscribers = self.inner.subscribers.lock().expect("emitter lock poisoned");
            subscribers.get(&event.kind).cloned().unwrap_or_default()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!(event = event.kind.as_str(), "event subscriber panicked");
            }
        }
    }

    // ------ convenience constructors ------

    pub fn emit_node_started(&self, node_id: &str, node_type: &str) {
        let mut event = WorkflowEvent::bare(EventKind::NodeStarted);
        event.node_id = Some(node_id.to_owned());
        event.node_type = Some(node_type.to_owned());
        self.emit(event);
    }

    pub fn emit_node_completed(
        &self,
        node_id: &str,
        node_type: &str,
        output_data: Option<DataMap>,
        route: Option<String>,
    ) {
        let mut event = WorkflowEvent::bare(EventKind::NodeCompleted);
        event.node_id = Some(node_id.to_owned());
        event.node_type = Some(node_type.to_owned());
        event.output_data = output_data;
        event.route = route;
        self.emit(event);
    }

    pub fn emit_node_failed(&self, node_id: &str, node_type: &str, error: &str) {
        let mut event = WorkflowEvent::bare(EventKind::NodeFailed);
        event.node_id = Some(node_id.to_owned());
        event.node_type = Some(node_type.to_owned());
        event.error = Some(error.to_owned());
        self.emit(event);
    }

    pub fn emit_workflow_completed(&self, status: &str, total_duration_seconds: Option<f64>) {
        let mut event = WorkflowEvent::bare(EventKind::WorkflowCompleted);
        event.status = Some(status.to_owned());
        event.total_duration_seconds = total_duration_seconds;
        self.emit(event);
    }

    pub fn emit_workflow_failed(&self, error: &str) {
        let mut event = WorkflowEvent::bare(EventKind::WorkflowFailed);
        event.error = Some(error.to_owned());
        self.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_run_in_registration_order() {
        let emitter = EventEmitter::new(Some("wf-1".to_owned()));
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = log.clone();
            emitter.subscribe(EventKind::NodeStarted, move |event| {
                log.lock()
                    .unwrap()
                    .push((tag, event.workflow_id.clone(), event.node_id.clone()));
            });
        }

        emitter.emit_node_started("n1", "mock");
        let entries = log.lock().unwrap().clone();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "first");
        assert_eq!(entries[1].0, "second");
        assert_eq!(entries[0].1.as_deref(), Some("wf-1"));
        assert_eq!(entries[0].2.as_deref(), Some("n1"));
    }

    #[test]
    fn panicking_subscriber_does_not_stop_emission() {
        let emitter = EventEmitter::new(None);
        let hits = Arc::new(Mutex::new(0));

        emitter.subscribe(EventKind::NodeFailed, |_| panic!("bad subscriber"));
        {
            let hits = hits.clone();
            emitter.subscribe(EventKind::NodeFailed, move |_| {
                *hits.lock().unwrap() += 1;
            });
        }

        emitter.emit_node_failed("n1", "mock", "boom");
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn subscribe_all_sees_every_kind() {
        let emitter = EventEmitter::new(None);
        let kinds = Arc::new(Mutex::new(Vec::new()));
        {
            let kinds = kinds.clone();
            emitter.subscribe_all(move |event| kinds.lock().unwrap().push(event.kind));
        }

        emitter.emit_node_started("n", "t");
        emitter.emit_workflow_completed("success", None);
        assert_eq!(
            kinds.lock().unwrap().as_slice(),
            &[EventKind::NodeStarted, EventKind::WorkflowCompleted]
        );
    }
}
