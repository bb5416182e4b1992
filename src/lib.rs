//! deckforge - CSV to Anki deck pipeline
//!
//! Turns a CSV of front/back pairs into ready-to-import .apkg decks:
//! per-row speech synthesis and image acquisition under a bounded
//! concurrency limit, then deterministic batched packaging.
//!
//! # Architecture
//!
//! A run flows through three stages:
//! - Ingest: delimiter-sniffed CSV parsing into indexed work units
//! - Schedule: each unit synthesizes audio and acquires images, with
//!   per-row caching, retries, and structured progress events
//! - Package: units are batched into one or more .apkg archives in
//!   original row order
//!
//! # Modules
//!
//! - `ingest`: CSV reading and work-list construction
//! - `tts`: speech synthesis client
//! - `images`: generative and search-based image acquisition
//! - `core`: scheduler, retry policy, packager, and the run driver
//! - `archive`: .apkg archive writer
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run against a CSV with defaults
//! deckforge run --input words.csv --deck-name "German A1"
//!
//! # Run from an options file, generating images
//! deckforge run --options deck.yaml --image-mode generate
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod images;
pub mod ingest;
pub mod naming;
pub mod text;
pub mod tts;

// Re-export main types at crate root for convenience
pub use config::{ImageMode, PipelineOptions, SourceColumn, VoiceSpec};
pub use core::{
    run_pipeline, run_pipeline_with, CancelReason, CancelSignal, RunCoordinator, RunReport,
    RunStatus, UnitContext,
};
pub use domain::{
    NullSink, ProgressCounters, ProgressEvent, ProgressSink, ProgressTracker, Row, UnitState,
    WorkUnit,
};
pub use error::{InputError, PackagingError, RunError};
