//! The path-trace observer collaborator (§6): invoked exactly once per data
//! delivery, with a copy of the delivered frame's path. This is the seam
//! the out-of-scope visualizer hooks into; `meshsim-core` only defines the
//! trait and a trivial in-memory sink used by tests.

use std::sync::{Arc, Mutex};

use crate::types::NodeId;

/// Read-only sink for delivered-data path traces. Implementors must
/// tolerate being called from any node's delivery task concurrently.
pub trait TraceSink: Send + Sync {
    fn on_delivery(&self, path: &[NodeId]);
}

/// An in-memory sink, for tests and any caller that just wants to collect
/// the traces of a finite run.
#[derive(Default)]
pub struct RecordingTraceSink {
    paths: Mutex<Vec<Vec<NodeId>>>,
}

impl RecordingTraceSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn paths(&self) -> Vec<Vec<NodeId>> {
        self.paths.lock().expect("trace sink mutex poisoned").clone()
    }
}

impl TraceSink for RecordingTraceSink {
    fn on_delivery(&self, path: &[NodeId]) {
        self.paths
            .lock()
            .expect("trace sink mutex poisoned")
            .push(path.to_vec());
    }
}
