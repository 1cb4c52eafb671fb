//! Locality and postcode suggestions for the checkout address form.
//!
//! Lookup is best-effort: any failure yields an empty list.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::AddressLookupConfig;

/// Most suggestions returned for one query.
pub const MAX_SUGGESTIONS: usize = 10;

/// Shortest query worth sending.
const MIN_QUERY_LEN: usize = 2;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A locality matching the shopper's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSuggestion {
    pub locality: String,
    pub state: String,
    pub postcode: String,
}

/// Address lookup service client.
#[derive(Clone)]
pub struct AddressLookupClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
}

impl AddressLookupClient {
    #[must_use]
    pub fn new(config: &AddressLookupConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Suggestions for `query`, at most [`MAX_SUGGESTIONS`].
    #[instrument(skip(self))]
    pub async fn suggest(&self, query: &str) -> Vec<AddressSuggestion> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return vec![];
        }

        let mut request = self.client.get(&self.url).query(&[("q", query)]);
        if let Some(key) = &self.api_key {
            request = request.header("AUTH-KEY", key.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "Address lookup rejected query");
                return vec![];
            }
            Err(e) => {
                warn!(error = %e, "Address lookup request failed");
                return vec![];
            }
        };

        match response.text().await {
            Ok(body) => parse_suggestions(&body),
            Err(e) => {
                warn!(error = %e, "Address lookup response unreadable");
                vec![]
            }
        }
    }
}

/// Parse a lookup response.
///
/// Accepts either a bare array of localities or the
/// `{"localities": {"locality": ...}}` envelope, where `locality` may be a
/// single object or an array.
#[must_use]
pub fn parse_suggestions(body: &str) -> Vec<AddressSuggestion> {
    let Ok(response) = serde_json::from_str::<LookupResponse>(body) else {
        warn!("Address lookup response was not understood");
        return vec![];
    };

    let localities = match response {
        LookupResponse::List(list) => list,
        LookupResponse::Envelope { localities } => match localities {
            Some(Localities {
                locality: Some(OneOrMany::Many(list)),
            }) => list,
            Some(Localities {
                locality: Some(OneOrMany::One(one)),
            }) => vec![one],
            _ => vec![],
        },
    };

    localities
        .into_iter()
        .map(|l| AddressSuggestion {
            locality: l.locality,
            state: l.state,
            postcode: l.postcode.into_string(),
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LookupResponse {
    List(Vec<Locality>),
    Envelope { localities: Option<Localities> },
}

#[derive(Deserialize)]
struct Localities {
    locality: Option<OneOrMany<Locality>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

#[derive(Deserialize)]
struct Locality {
    #[serde(alias = "location")]
    locality: String,
    #[serde(default)]
    state: String,
    postcode: Postcode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Postcode {
    Text(String),
    Number(u32),
}

impl Postcode {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => format!("{number:04}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_many_localities() {
        let body = r#"{"localities":{"locality":[
            {"category":"Delivery Area","id":1,"location":"FITZROY","postcode":3065,"state":"VIC"},
            {"category":"Delivery Area","id":2,"location":"FITZROY NORTH","postcode":3068,"state":"VIC"}
        ]}}"#;
        let suggestions = parse_suggestions(body);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(
            suggestions.first(),
            Some(&AddressSuggestion {
                locality: "FITZROY".to_string(),
                state: "VIC".to_string(),
                postcode: "3065".to_string(),
            })
        );
    }

    #[test]
    fn test_envelope_with_single_locality() {
        let body = r#"{"localities":{"locality":{"location":"DARWIN","postcode":"0800","state":"NT"}}}"#;
        let suggestions = parse_suggestions(body);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions.first().map(|s| s.postcode.as_str()), Some("0800"));
    }

    #[test]
    fn test_numeric_postcode_keeps_leading_zero() {
        let body = r#"[{"locality":"DARWIN","state":"NT","postcode":800}]"#;
        assert_eq!(
            parse_suggestions(body).first().map(|s| s.postcode.clone()),
            Some("0800".to_string())
        );
    }

    #[test]
    fn test_results_are_capped() {
        let entries: Vec<String> = (0..25)
            .map(|i| format!(r#"{{"locality":"TOWN {i}","state":"VIC","postcode":"3{i:03}"}}"#))
            .collect();
        let body = format!("[{}]", entries.join(","));
        assert_eq!(parse_suggestions(&body).len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn test_empty_and_malformed_responses() {
        assert!(parse_suggestions(r#"{"localities":""}"#).is_empty());
        assert!(parse_suggestions(r#"{"localities":null}"#).is_empty());
        assert!(parse_suggestions("<html>").is_empty());
    }

    #[tokio::test]
    async fn test_short_query_makes_no_request() {
        let client = AddressLookupClient::new(&AddressLookupConfig {
            url: "http://127.0.0.1:9/lookup".to_string(),
            api_key: None,
        });
        assert!(client.suggest(" a ").await.is_empty());
    }
}
