//! Outbound integrations besides the commerce backend and payment providers.
//!
//! - `analytics` - GA4 Measurement Protocol events (fire-and-forget)
//! - `marketing` - Klaviyo newsletter signups
//! - `address_lookup` - locality/postcode suggestions
//! - `reviews` - product review forwarding

pub mod address_lookup;
pub mod analytics;
pub mod marketing;
pub mod reviews;

pub use address_lookup::{AddressLookupClient, AddressSuggestion};
pub use analytics::{AnalyticsSink, Ga4Client, NoopAnalytics};
pub use marketing::{KlaviyoClient, KlaviyoError};
pub use reviews::{ReviewError, ReviewForwarder, ReviewSubmission};
