//! Core types for Copperleaf.
//!
//! This module provides type-safe wrappers for common commerce concepts.

pub mod email;
pub mod id;
pub mod order_key;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use order_key::OrderKey;
pub use price::{CurrencyCode, Price, PriceError};
pub use status::*;
