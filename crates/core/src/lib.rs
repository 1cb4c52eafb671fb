//! Copperleaf Core - Shared value types.
//!
//! Types used by the storefront server and its tests:
//! - money parsing and display formatting for backend price strings
//! - validated email addresses for checkout and newsletter forms
//! - order identifiers and the order key capability token
//! - order and payment status enums
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no async.
//! Everything here is deterministic and unit-testable in isolation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
