//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request spans)
//! 3. Request ID
//! 4. Session layer (tower-sessions, in-memory store)
//! 5. Shopper (binds the request to its [`crate::session::ShopperSession`])
//! 6. Rate limiting on form endpoints (governor)

pub mod rate_limit;
pub mod request_id;
pub mod session;
pub mod shopper;

pub use rate_limit::form_rate_limiter;
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
pub use shopper::{Shopper, shopper_middleware};
