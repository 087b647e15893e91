//! Run milestones, published over a lossy channel.
//!
//! Delivery is best effort: a missing, dropped, or full receiver never
//! blocks or fails the optimization loop.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use bk_types::Observation;

/// Milestones emitted by the engine as a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoopEvent {
    RunStarted {
        run_id: Uuid,
        observation_count: usize,
    },
    IterationCompleted {
        run_id: Uuid,
        iteration: usize,
        observation_count: usize,
        best_objective: f64,
    },
    RunFinished {
        run_id: Uuid,
        iterations: usize,
        best: Option<Observation>,
    },
    RunFailed {
        run_id: Uuid,
        error: String,
    },
}

/// Sends an event if a receiver is attached; drops it otherwise.
pub(crate) fn emit(sender: &Option<Sender<LoopEvent>>, event: LoopEvent) {
    if let Some(tx) = sender {
        if tx.try_send(event).is_err() {
            debug!("event receiver unavailable, dropping loop event");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
