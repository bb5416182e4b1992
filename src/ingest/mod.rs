//! Input ingestion: CSV parsing with delimiter sniffing.

pub mod csv;

pub use csv::{detect_delimiter, read_rows, rows_to_work, DELIMITER_CANDIDATES};
