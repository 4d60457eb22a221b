//! Shared utilities for cohort preparation crates.
//!
//! This crate provides common helpers used across the workspace:
//! Polars `AnyValue` conversions and warehouse timestamp handling.

pub mod datetime;
pub mod polars;

// Re-export commonly used functions at crate root for convenience
pub use datetime::{
    add_years, day_delta, format_date, format_minute, format_precise, parse_timestamp,
};
pub use polars::{
    any_to_string, any_to_string_non_empty, format_numeric, parse_f64, parse_i64,
};
