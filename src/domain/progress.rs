//! Progress events and run counters.
//!
//! The sink is the pipeline's entire observable output besides the final
//! files. It is passed explicitly into every layer that reports; there is
//! no global log state. Counter mutations and event emission happen under
//! one lock so observers always see consistent snapshots where
//! `queued + running + done + failed == total`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Severity of a log event forwarded to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Snapshot of the run's counters at one observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub retries: u64,
}

/// Structured events emitted over the course of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Preflight {
        message: String,
    },
    Progress(ProgressCounters),
    Log {
        level: LogLevel,
        message: String,
    },
    PackStart {
        total: usize,
        parts: usize,
        batch_size: usize,
    },
    PackPart {
        part_index: usize,
        parts: usize,
        filename: PathBuf,
    },
    PackDone {
        outputs: Vec<PathBuf>,
        duration_ms: u64,
    },
}

/// Event sink observers implement. Must be cheap and non-blocking; it is
/// called from inside the scheduler's critical sections.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// A sink that drops everything. Handy for tests and library callers that
/// only want the final report.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

struct CounterState {
    running: usize,
    done: usize,
    failed: usize,
    retries: u64,
}

/// Mutex-guarded run counters. Every mutation re-emits a `Progress`
/// snapshot, so the sink sees one event per state transition.
pub struct ProgressTracker {
    total: usize,
    state: Mutex<CounterState>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    pub fn new(total: usize, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            total,
            state: Mutex::new(CounterState {
                running: 0,
                done: 0,
                failed: 0,
                retries: 0,
            }),
            sink,
        }
    }

    fn snapshot(&self, state: &CounterState) -> ProgressCounters {
        ProgressCounters {
            queued: self
                .total
                .saturating_sub(state.done + state.failed + state.running),
            running: state.running,
            done: state.done,
            failed: state.failed,
            retries: state.retries,
        }
    }

    fn emit_locked(&self, state: &CounterState) {
        self.sink.emit(ProgressEvent::Progress(self.snapshot(state)));
    }

    /// A unit was admitted under the concurrency limit.
    pub fn admit(&self) {
        let mut state = self.state.lock().expect("counter lock");
        state.running += 1;
        self.emit_locked(&state);
    }

    /// A running unit finished cleanly.
    pub fn finish_done(&self) {
        let mut state = self.state.lock().expect("counter lock");
        state.running -= 1;
        state.done += 1;
        self.emit_locked(&state);
    }

    /// A running unit failed.
    pub fn finish_failed(&self) {
        let mut state = self.state.lock().expect("counter lock");
        state.running -= 1;
        state.failed += 1;
        self.emit_locked(&state);
    }

    /// A retry happened somewhere inside a unit.
    pub fn record_retry(&self) {
        let mut state = self.state.lock().expect("counter lock");
        state.retries += 1;
        self.emit_locked(&state);
    }

    /// Current counters, without emitting.
    pub fn counters(&self) -> ProgressCounters {
        let state = self.state.lock().expect("counter lock");
        self.snapshot(&state)
    }

    /// Forward a log event to the sink.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.emit(ProgressEvent::Log {
            level,
            message: message.into(),
        });
    }
}
