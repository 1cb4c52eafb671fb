//! JSON API handlers.
//!
//! Every handler returns `Result<Json<_>, AppError>`; failures render as
//! `{"error": "..."}` with the status from [`crate::error::AppError::status`].

pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod products;
pub mod services;
