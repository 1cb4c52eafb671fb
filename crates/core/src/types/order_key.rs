//! Order key capability token.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The secret key paired with an order id.
///
/// Order ids are sequential and guessable, so every post-creation lookup must
/// also present the key the backend issued at checkout. Comparison runs in
/// time independent of where the first mismatching byte is, and `Debug`
/// output only shows a short prefix.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OrderKey(String);

impl OrderKey {
    /// Wrap a key issued by the backend.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building receipt URLs and backend queries.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a caller-supplied key matches this one.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let ours = self.0.as_bytes();
        let theirs = candidate.as_bytes();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter()
            .zip(theirs)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "OrderKey({prefix}…)")
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
