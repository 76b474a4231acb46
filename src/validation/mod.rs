//! Validation of loaded price data.
//!
//! Checks price and return validity and calendar continuity before a
//! table is handed to the harness.

pub mod data_integrity;

pub use data_integrity::{CheckResult, DataIntegrityReport, DataIntegrityValidator};
