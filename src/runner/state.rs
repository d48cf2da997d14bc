//! Run state machine
//!
//! ```text
//! Idle -> SnapshotOpen -> Planning -> Executing -> Aggregating -> Closed
//!   \__________\______________\___________\____________\______-> Failed
//! ```
//!
//! - Transitions are explicit, never inferred
//! - `Closed` and `Failed` are terminal
//! - Every transition is logged

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing acquired yet
    Idle,
    /// Read snapshot is open
    SnapshotOpen,
    /// Partitions are being listed
    Planning,
    /// Partitions are running on the pool
    Executing,
    /// Outcomes are being folded into the summary
    Aggregating,
    /// Summary built and snapshot released
    Closed,
    /// Run aborted; snapshot released if it was opened
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::SnapshotOpen => "SNAPSHOT_OPEN",
            Self::Planning => "PLANNING",
            Self::Executing => "EXECUTING",
            Self::Aggregating => "AGGREGATING",
            Self::Closed => "CLOSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, SnapshotOpen)
            | (SnapshotOpen, Planning)
            | (Planning, Executing)
            | (Executing, Aggregating)
            | (Aggregating, Closed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current state of one run plus the path it took
#[derive(Debug, Clone)]
pub struct RunLifecycle {
    run_id: Uuid,
    state: RunState,
    history: Vec<RunState>,
}

impl RunLifecycle {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited, starting with `Idle`
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: RunState) -> EngineResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        log_event_with_fields(
            Event::RunStateChanged,
            &[
                ("run_id", &self.run_id.to_string()),
                ("from", self.state.as_str()),
                ("to", next.as_str()),
            ],
        );

        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed`, returning the state the run failed from.
    ///
    /// A run already in a terminal state keeps it.
    pub fn fail(&mut self) -> RunState {
        let from = self.state;
        let _ = self.advance(RunState::Failed);
        from
    }
}
