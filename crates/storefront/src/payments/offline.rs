//! Gateways with no online capture (cash on delivery, bank transfer, cheque).

use async_trait::async_trait;

use super::{PaymentAdapter, PaymentError, PaymentOutcome, PaymentRequest};

/// Completes immediately; the backend records the order as awaiting payment.
pub struct OfflineAdapter {
    gateway_id: String,
}

impl OfflineAdapter {
    #[must_use]
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
        }
    }
}

#[async_trait]
impl PaymentAdapter for OfflineAdapter {
    fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    async fn initiate(&self, _request: PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        Ok(PaymentOutcome::Completed {
            transaction_id: None,
        })
    }
}
