//! Per-shopper cart state synchronized with the backend session cart.

mod store;

pub use store::{CartError, CartStore};
