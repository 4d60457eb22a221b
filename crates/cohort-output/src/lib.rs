//! CSV output for cohort records.
//!
//! - **common**: directory helpers
//! - **csv**: frame to CSV encoding and single-file writes
//! - **chunked**: fixed-size chunk files with zero-padded offsets

pub mod chunked;
pub mod common;
pub mod csv;

pub use chunked::{ChunkedOutput, chunk_path, write_chunked};
pub use common::{ensure_parent_dir, write_text};
pub use csv::{encode_csv, write_csv, write_frame};
