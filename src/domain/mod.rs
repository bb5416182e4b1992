//! Domain types for the deckforge pipeline.
//!
//! This module contains the core data structures:
//! - `Row` / `WorkUnit`: one CSV record and its mutable processing outcome
//! - `ImageResult` / `ImageSource`: acquired images with provenance
//! - Progress events, counters, and the sink trait observers implement

pub mod progress;
pub mod unit;

pub use progress::{
    LogLevel, NullSink, ProgressCounters, ProgressEvent, ProgressSink, ProgressTracker,
};
pub use unit::{ImageResult, ImageSource, Row, UnitState, WorkUnit};
