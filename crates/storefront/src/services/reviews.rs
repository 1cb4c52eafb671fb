//! Product review submission.
//!
//! Reviews are comments on the product post. The form is forwarded as
//! multipart to the backend comment endpoint; the endpoint answers a
//! successful post with a redirect, which is not followed.

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Form fields passed through to the backend.
const FORWARDED_FIELDS: &[&str] = &["comment_post_ID", "author", "email", "comment", "rating"];

const MAX_COMMENT_CHARS: usize = 5000;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// The submission is incomplete or malformed.
    #[error("{0}")]
    Invalid(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused the review.
    #[error("Review rejected with status {0}")]
    Rejected(u16),
}

/// A validated review ready to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSubmission {
    fields: Vec<(String, String)>,
}

impl ReviewSubmission {
    /// Validate raw form fields; unknown fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Invalid`] when the product id, comment, author
    /// or rating is missing or malformed.
    pub fn from_fields(fields: Vec<(String, String)>) -> Result<Self, ReviewError> {
        let fields: Vec<(String, String)> = fields
            .into_iter()
            .filter(|(name, _)| FORWARDED_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name, value.trim().to_string()))
            .collect();
        let value = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map_or("", |(_, v)| v.as_str())
        };

        if value("comment_post_ID").parse::<u64>().is_err() {
            return Err(ReviewError::Invalid("Missing product.".to_string()));
        }
        if value("author").is_empty() {
            return Err(ReviewError::Invalid("Please enter your name.".to_string()));
        }
        let comment = value("comment");
        if comment.is_empty() {
            return Err(ReviewError::Invalid("Please write a review.".to_string()));
        }
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(ReviewError::Invalid("Your review is too long.".to_string()));
        }
        if !matches!(value("rating").parse::<u8>(), Ok(1..=5)) {
            return Err(ReviewError::Invalid("Please choose a rating.".to_string()));
        }

        Ok(Self { fields })
    }

    fn into_form(self) -> Form {
        self.fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
    }
}

/// Forwards reviews to the backend comment endpoint.
#[derive(Clone)]
pub struct ReviewForwarder {
    client: reqwest::Client,
    url: String,
}

impl ReviewForwarder {
    #[must_use]
    pub fn new(review_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: review_url.into(),
        }
    }

    /// Post the review.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend answers with an
    /// error status. Redirects count as success.
    #[instrument(skip(self, review))]
    pub async fn submit(&self, review: ReviewSubmission) -> Result<(), ReviewError> {
        let response = self
            .client
            .post(&self.url)
            .multipart(review.into_form())
            .send()
            .await?;
        let status = response.status();

        if status.is_success() || status.is_redirection() {
            info!(status = %status, "Review forwarded");
            Ok(())
        } else {
            warn!(status = %status, "Backend rejected review");
            Err(ReviewError::Rejected(status.as_u16()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn valid() -> Vec<(String, String)> {
        fields(&[
            ("comment_post_ID", "103"),
            ("author", "Ada"),
            ("email", "ada@example.com"),
            ("comment", " Lovely pot. "),
            ("rating", "5"),
        ])
    }

    #[test]
    fn test_valid_submission_drops_unknown_fields() {
        let mut raw = valid();
        raw.push(("_wp_unfiltered_html_comment".to_string(), "x".to_string()));
        let review = ReviewSubmission::from_fields(raw).unwrap();
        assert_eq!(review.fields.len(), 5);
        assert!(review.fields.contains(&("comment".to_string(), "Lovely pot.".to_string())));
    }

    #[test]
    fn test_rating_must_be_one_to_five() {
        for rating in ["0", "6", "", "five"] {
            let mut raw = valid();
            raw.retain(|(k, _)| k != "rating");
            raw.push(("rating".to_string(), rating.to_string()));
            let err = ReviewSubmission::from_fields(raw).unwrap_err();
            assert_eq!(err.to_string(), "Please choose a rating.");
        }
    }

    #[test]
    fn test_product_and_comment_are_required() {
        let mut raw = valid();
        raw.retain(|(k, _)| k != "comment_post_ID");
        assert!(matches!(
            ReviewSubmission::from_fields(raw),
            Err(ReviewError::Invalid(_))
        ));

        let mut raw = valid();
        raw.retain(|(k, _)| k != "comment");
        raw.push(("comment".to_string(), "   ".to_string()));
        assert_eq!(
            ReviewSubmission::from_fields(raw).unwrap_err().to_string(),
            "Please write a review."
        );
    }
}
