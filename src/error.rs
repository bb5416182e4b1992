//! Error taxonomy for a pipeline run.
//!
//! Per-row problems (TTS failures, provider errors, bad downloads) are
//! handled inside the scheduler and never reach this level; only input
//! validation and packaging can abort a run.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal input problems, raised before any work is admitted.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read input file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV with delimiter {delimiter:?}: {source}")]
    Parse {
        delimiter: char,
        #[source]
        source: csv::Error,
    },

    #[error("No rows in input CSV")]
    Empty,

    #[error("CSV missing required column(s): {0}")]
    MissingColumns(String),
}

/// Fatal packaging problems. Output integrity cannot be partial, so any
/// archive build or write failure aborts the run.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Failed to read media file {path}: {source}")]
    MediaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build deck archive: {0}")]
    Archive(#[source] anyhow::Error),

    #[error("Failed to write output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level run failure.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error("Failed to prepare output directory {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
