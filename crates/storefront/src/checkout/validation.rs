//! Order submission preconditions, checked before any backend call.

use copperleaf_core::Email;

use super::error::CheckoutError;
use super::state::{CheckoutPhase, CheckoutState};
use crate::commerce::Address;

/// Check that `state` can be submitted as an order.
///
/// # Errors
///
/// Returns [`CheckoutError::Validation`] naming the first unmet condition, or
/// [`CheckoutError::Busy`] when an order is already being placed.
pub fn validate_order(state: &CheckoutState) -> Result<(), CheckoutError> {
    if state.loading.order || state.phase == CheckoutPhase::Submitting {
        return Err(CheckoutError::Busy("Your order is already being placed."));
    }
    match state.phase {
        CheckoutPhase::Ready => {}
        CheckoutPhase::EmptyCart => {
            return Err(invalid("Your cart is empty."));
        }
        CheckoutPhase::Completed | CheckoutPhase::AwaitingPayment => {
            return Err(invalid("This order has already been placed."));
        }
        CheckoutPhase::Initializing | CheckoutPhase::Submitting => {
            return Err(invalid("Checkout is still loading. Please wait a moment."));
        }
    }

    if state.selected_shipping_rate().is_none() {
        return Err(invalid("Please choose a shipping method."));
    }

    validate_address(&state.billing, "billing")?;
    if state.ship_to_different_address {
        validate_address(&state.shipping, "shipping")?;
    }

    let method = state
        .payment_method
        .as_deref()
        .ok_or_else(|| invalid("Please choose a payment method."))?;
    if !state.payment_gateways.iter().any(|g| g.id == method) {
        return Err(invalid("Please choose a payment method."));
    }

    Ok(())
}

fn validate_address(address: &Address, which: &str) -> Result<(), CheckoutError> {
    if address.first_name.trim().is_empty() {
        return Err(invalid(format!("Please enter your {which} first name.")));
    }
    if address.last_name.trim().is_empty() {
        return Err(invalid(format!("Please enter your {which} last name.")));
    }
    if Email::parse(&address.email).is_err() {
        return Err(invalid(format!("Please enter a valid {which} email address.")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> CheckoutError {
    CheckoutError::Validation(message.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use copperleaf_core::CurrencyCode;

    use super::*;
    use crate::commerce::{PaymentGateway, ShippingRate};

    fn complete_state() -> CheckoutState {
        CheckoutState {
            phase: CheckoutPhase::Ready,
            billing: Address {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: "ada@example.org".to_string(),
                ..Address::default()
            },
            selected_rate: Some("flat".to_string()),
            shipping_rates: vec![ShippingRate {
                id: "flat".to_string(),
                label: "Flat".to_string(),
                cost: "10.00".to_string(),
            }],
            payment_method: Some("cod".to_string()),
            payment_gateways: vec![PaymentGateway {
                id: "cod".to_string(),
                title: "Cash".to_string(),
                description: None,
            }],
            ..CheckoutState::new(CurrencyCode::USD)
        }
    }

    fn message(state: &CheckoutState) -> String {
        validate_order(state).unwrap_err().to_string()
    }

    #[test]
    fn test_complete_state_passes() {
        assert!(validate_order(&complete_state()).is_ok());
    }

    #[test]
    fn test_rate_must_be_selected_and_offered() {
        let mut state = complete_state();
        state.selected_rate = None;
        assert_eq!(message(&state), "Please choose a shipping method.");

        state.selected_rate = Some("gone".to_string());
        assert_eq!(message(&state), "Please choose a shipping method.");
    }

    #[test]
    fn test_billing_requires_names_and_email() {
        let mut state = complete_state();
        state.billing.email = "not-an-email".to_string();
        assert_eq!(message(&state), "Please enter a valid billing email address.");

        state.billing.last_name = "  ".to_string();
        assert_eq!(message(&state), "Please enter your billing last name.");
    }

    #[test]
    fn test_shipping_checked_only_when_different() {
        let mut state = complete_state();
        assert!(validate_order(&state).is_ok());
        state.ship_to_different_address = true;
        assert_eq!(message(&state), "Please enter your shipping first name.");
    }

    #[test]
    fn test_payment_method_required() {
        let mut state = complete_state();
        state.payment_method = None;
        assert_eq!(message(&state), "Please choose a payment method.");
    }

    #[test]
    fn test_double_submit_refused() {
        let mut state = complete_state();
        state.loading.order = true;
        assert!(matches!(validate_order(&state), Err(CheckoutError::Busy(_))));
    }
}
