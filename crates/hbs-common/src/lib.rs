//! Shared types for HBS (Holiday Booking Sync)
//!
//! Common error type, configuration profiles, logging setup and formatting
//! helpers used by the sync, database and ingest crates.

pub mod config;
pub mod error;
pub mod format;
pub mod logging;

pub use error::{HbsError, Result};
