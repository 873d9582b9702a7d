//! Shared utilities.
//!
//! Includes:
//! - Date/time helpers (bitemporal timestamp formatting for the store)
//! - String normalization and prompt-template helpers
//! - Tolerant JSON decoding for model responses

pub mod datetime;
pub mod json;
pub mod text;
