//! Transfer state machine and the counters guarded by the per-transfer lock.
//!
//! ```text
//! Idle -> Opening -> Active -> Draining -> Finished
//!            \______________________________/   (open failed)
//! ```

use storlink_protocol::TransferPhase;
use tracing::{debug, warn};

use crate::TransferError;

/// Inputs that move a transfer between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The coordinator starts opening the object.
    Open,
    /// The object is open; issuance may begin.
    Opened,
    /// Opening failed; nothing was issued.
    OpenFailed,
    /// `done` was set.
    Halt,
    /// `done` is set and nothing is outstanding.
    Drained,
}

/// The transition function. `None` for transitions that are not allowed.
pub fn next_phase(phase: TransferPhase, event: Event) -> Option<TransferPhase> {
    use TransferPhase::*;
    match (phase, event) {
        (Idle, Event::Open) => Some(Opening),
        (Opening, Event::Opened) => Some(Active),
        (Opening, Event::OpenFailed) => Some(Finished),
        (Active | Draining, Event::Halt) => Some(Draining),
        (Active | Draining, Event::Drained) => Some(Finished),
        _ => None,
    }
}

/// Shared state of one transfer.
#[derive(Debug)]
pub struct TransferState {
    phase: TransferPhase,
    /// Issued but not yet completed operations.
    pub(crate) outstanding: usize,
    /// Window size from the most recent refill.
    pub(crate) optimal: usize,
    /// Once set, nothing new is issued.
    done: bool,
    /// First terminal error; later ones are dropped.
    first_error: Option<TransferError>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferState {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
            outstanding: 0,
            optimal: 0,
            done: false,
            first_error: None,
        }
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn error(&self) -> Option<&TransferError> {
        self.first_error.as_ref()
    }

    /// Applies `event`, returning whether the transition was legal.
    pub fn apply(&mut self, event: Event) -> bool {
        match next_phase(self.phase, event) {
            Some(next) => {
                self.phase = next;
                true
            }
            None => {
                warn!(phase = ?self.phase, ?event, "ignoring invalid transfer transition");
                false
            }
        }
    }

    /// Stops further issuance without recording an error.
    pub fn halt(&mut self) {
        self.done = true;
        if matches!(self.phase, TransferPhase::Active) {
            self.apply(Event::Halt);
        }
    }

    /// Records `error` if it is the first one, then halts.
    pub fn fail(&mut self, error: TransferError) {
        self.record(error);
        self.halt();
    }

    /// Records `error` if it is the first one without touching `done`.
    pub fn record(&mut self, error: TransferError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        } else {
            debug!(%error, "dropping error after the first");
        }
    }

    /// `done` with nothing outstanding and not yet reported.
    pub fn ready_to_finish(&self) -> bool {
        self.done && self.outstanding == 0 && !self.phase.is_terminal()
    }

    /// Moves the recorded outcome out; subsequent calls return `Ok`.
    pub fn take_result(&mut self) -> Result<(), TransferError> {
        match self.first_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
