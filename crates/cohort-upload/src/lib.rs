//! Record import into, and export from, a REDCap-style API.
//!
//! Frames are sent in batches of CSV over form-encoded POSTs. Each call
//! must report back exactly the number of records it was given; the first
//! batch that fails stops the upload. Exports fetch the whole project as
//! one flat CSV.

pub mod api;
pub mod batch;
pub mod client;
pub mod error;

pub use api::{ExportApi, ImportApi, ImportResult, parse_export_response, parse_import_response};
pub use batch::{EncodedBatch, UploadSummary, encode_batch, upload_frame};
pub use client::RedcapClient;
pub use error::{Result, UploadError};
