//! Status enums for orders and payments.

use serde::{Deserialize, Serialize};

/// Order status as reported by the commerce backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    CheckoutDraft,
}

impl OrderStatus {
    /// Whether payment has been recorded against the order.
    #[must_use]
    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Processing | Self::Completed)
    }

    /// Human readable label for receipts.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending payment",
            Self::Processing => "Processing",
            Self::OnHold => "On hold",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
            Self::Failed => "Failed",
            Self::CheckoutDraft => "Draft",
        }
    }
}

/// Payment intent status as reported by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl PaymentStatus {
    /// Whether funds are secured and the order may be finalized.
    #[must_use]
    pub const fn is_successful(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_wire_format() {
        let status: OrderStatus = serde_json::from_str("\"ON_HOLD\"").unwrap();
        assert_eq!(status, OrderStatus::OnHold);
        assert!(OrderStatus::Processing.is_paid());
        assert!(!OrderStatus::Pending.is_paid());
    }

    #[test]
    fn test_payment_status_wire_format() {
        let status: PaymentStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(status, PaymentStatus::RequiresAction);
        assert!(PaymentStatus::Succeeded.is_successful());
        assert!(!PaymentStatus::Processing.is_successful());
    }
}
