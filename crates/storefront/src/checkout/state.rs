//! Checkout state and its pure reducer.
//!
//! Every change to checkout state goes through [`reduce`]; the orchestrator
//! performs I/O and dispatches the results as [`CheckoutAction`]s.

use copperleaf_core::{CurrencyCode, OrderId, Price};
use serde::Serialize;

use crate::commerce::{
    Address, AddressPatch, AppliedCoupon, Cart, CartTotals, PaymentGateway, ShippingRate,
};

/// Where checkout is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    #[default]
    Initializing,
    /// Accepting edits and selections.
    Ready,
    Submitting,
    /// The shopper was sent to the payment provider to finish paying.
    AwaitingPayment,
    Completed,
    /// The cart was empty; checkout cannot proceed.
    EmptyCart,
}

/// Per-operation in-flight flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadingFlags {
    pub cart: bool,
    pub shipping: bool,
    pub coupon: bool,
    pub order: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// A transient message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Everything the checkout page shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutState {
    pub phase: CheckoutPhase,
    pub currency: CurrencyCode,
    pub billing: Address,
    pub shipping: Address,
    pub ship_to_different_address: bool,
    pub order_notes: String,
    pub selected_rate: Option<String>,
    pub payment_method: Option<String>,
    pub applied_coupons: Vec<AppliedCoupon>,
    pub totals: CartTotals,
    pub shipping_rates: Vec<ShippingRate>,
    pub payment_gateways: Vec<PaymentGateway>,
    /// Subtotal less discount plus the selected rate, or the backend total.
    pub displayed_total: String,
    pub loading: LoadingFlags,
    pub notifications: Vec<Notification>,
    /// Bumped on every payment method change.
    pub payment_epoch: u64,
    /// Bumped each time an address recalculation is scheduled.
    #[serde(skip)]
    pub recalculation: u64,
    pub order_id: Option<OrderId>,
}

impl CheckoutState {
    #[must_use]
    pub fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            ..Self::default()
        }
    }

    /// The address orders ship to.
    #[must_use]
    pub const fn effective_shipping(&self) -> &Address {
        if self.ship_to_different_address {
            &self.shipping
        } else {
            &self.billing
        }
    }

    #[must_use]
    pub fn selected_shipping_rate(&self) -> Option<&ShippingRate> {
        let id = self.selected_rate.as_deref()?;
        self.shipping_rates.iter().find(|r| r.id == id)
    }
}

/// Everything that can happen to checkout state.
#[derive(Debug, Clone)]
pub enum CheckoutAction {
    /// Start over (entering checkout again).
    Reset,
    CartLoading,
    /// First load finished.
    Initialized {
        cart: Cart,
        gateways: Vec<PaymentGateway>,
    },
    /// Fresh cart aggregates from the backend.
    CartRefreshed(Cart),
    CartLoadFailed(String),
    BillingEdited(AddressPatch),
    ShippingEdited(AddressPatch),
    ShipToDifferentAddressSet(bool),
    OrderNotesSet(String),
    RecalculationScheduled,
    /// A pending recalculation was dropped before it ran.
    RecalculationCancelled,
    /// The recalculation scheduled as `generation` finished.
    RecalculationFinished(u64),
    RecalculationFailed { generation: u64, message: String },
    ShippingRateSelected(String),
    PaymentMethodSelected(String),
    CouponStarted,
    CouponFinished(Notification),
    OrderSubmitted,
    /// The order could not be placed; back to `Ready`.
    OrderFailed(String),
    /// An adapter result arrived after the payment method changed.
    OrderSuperseded,
    OrderAwaitingPayment(OrderId),
    OrderCompleted(OrderId),
    Notify(Notification),
}

/// Message queued when a payment result is discarded.
pub const PAYMENT_METHOD_CHANGED: &str =
    "Your payment method changed while we were processing. Please place your order again.";

/// Apply `action` to `state`.
#[must_use]
pub fn reduce(mut state: CheckoutState, action: CheckoutAction) -> CheckoutState {
    match action {
        CheckoutAction::Reset => {
            state = CheckoutState {
                recalculation: state.recalculation,
                ..CheckoutState::new(state.currency)
            };
        }
        CheckoutAction::CartLoading => state.loading.cart = true,
        CheckoutAction::Initialized { cart, gateways } => {
            state.loading.cart = false;
            if cart.is_empty() {
                state.phase = CheckoutPhase::EmptyCart;
                return state;
            }
            if state.selected_rate.is_none() {
                state.selected_rate.clone_from(&cart.chosen_shipping_rate);
            }
            state = apply_cart(state, cart);
            if state
                .payment_method
                .as_ref()
                .is_none_or(|id| !gateways.iter().any(|g| &g.id == id))
            {
                state.payment_method = gateways.first().map(|g| g.id.clone());
            }
            state.payment_gateways = gateways;
            state.phase = CheckoutPhase::Ready;
        }
        CheckoutAction::CartRefreshed(cart) => {
            state.loading.cart = false;
            state = apply_cart(state, cart);
        }
        CheckoutAction::CartLoadFailed(message) => {
            state.loading.cart = false;
            state.notifications.push(Notification::error(message));
        }
        CheckoutAction::BillingEdited(patch) => patch.apply_to(&mut state.billing),
        CheckoutAction::ShippingEdited(patch) => patch.apply_to(&mut state.shipping),
        CheckoutAction::ShipToDifferentAddressSet(value) => {
            state.ship_to_different_address = value;
        }
        CheckoutAction::OrderNotesSet(notes) => state.order_notes = notes,
        CheckoutAction::RecalculationScheduled => {
            state.loading.shipping = true;
            state.recalculation = state.recalculation.wrapping_add(1);
        }
        CheckoutAction::RecalculationCancelled => state.loading.shipping = false,
        // A superseded recalculation leaves the flag to the newer one
        CheckoutAction::RecalculationFinished(generation) => {
            if generation == state.recalculation {
                state.loading.shipping = false;
            }
        }
        CheckoutAction::RecalculationFailed {
            generation,
            message,
        } => {
            if generation == state.recalculation {
                state.loading.shipping = false;
            }
            state.notifications.push(Notification::error(message));
        }
        CheckoutAction::ShippingRateSelected(id) => {
            state.selected_rate = Some(id);
            state.displayed_total = displayed_total(&state);
        }
        CheckoutAction::PaymentMethodSelected(id) => {
            if state.payment_method.as_deref() != Some(id.as_str()) {
                state.payment_method = Some(id);
                state.payment_epoch += 1;
            }
        }
        CheckoutAction::CouponStarted => state.loading.coupon = true,
        CheckoutAction::CouponFinished(notification) => {
            state.loading.coupon = false;
            state.notifications.push(notification);
        }
        CheckoutAction::OrderSubmitted => {
            state.phase = CheckoutPhase::Submitting;
            state.loading.order = true;
        }
        CheckoutAction::OrderFailed(message) => {
            state.phase = CheckoutPhase::Ready;
            state.loading.order = false;
            state.notifications.push(Notification::error(message));
        }
        CheckoutAction::OrderSuperseded => {
            state.phase = CheckoutPhase::Ready;
            state.loading.order = false;
            state
                .notifications
                .push(Notification::warning(PAYMENT_METHOD_CHANGED));
        }
        CheckoutAction::OrderAwaitingPayment(order_id) => {
            state.phase = CheckoutPhase::AwaitingPayment;
            state.loading.order = false;
            state.order_id = Some(order_id);
        }
        CheckoutAction::OrderCompleted(order_id) => {
            state.phase = CheckoutPhase::Completed;
            state.loading = LoadingFlags::default();
            state.order_id = Some(order_id);
        }
        CheckoutAction::Notify(notification) => state.notifications.push(notification),
    }
    state
}

/// Take aggregates, coupons and rates from `cart` and re-run rate selection.
fn apply_cart(mut state: CheckoutState, cart: Cart) -> CheckoutState {
    state.selected_rate = select_rate(state.selected_rate.as_deref(), &cart.shipping_rates);
    state.totals = cart.totals;
    state.applied_coupons = cart.applied_coupons;
    state.shipping_rates = cart.shipping_rates;
    state.displayed_total = displayed_total(&state);
    state
}

/// Keep `previous` if it is still offered, otherwise take the first rate.
#[must_use]
pub fn select_rate(previous: Option<&str>, rates: &[ShippingRate]) -> Option<String> {
    previous
        .and_then(|id| rates.iter().find(|r| r.id == id))
        .or_else(|| rates.first())
        .map(|r| r.id.clone())
}

/// Subtotal less discount plus the selected rate's cost.
///
/// Falls back to the backend's total when no rate is selected or an amount
/// cannot be parsed.
#[must_use]
pub fn displayed_total(state: &CheckoutState) -> String {
    let currency = state.currency;
    let computed = state.selected_shipping_rate().and_then(|rate| {
        let subtotal = Price::parse_display(&state.totals.subtotal, currency).ok()?;
        let discount = if state.totals.discount_total.trim().is_empty() {
            Price::zero(currency)
        } else {
            Price::parse_display(&state.totals.discount_total, currency).ok()?
        };
        let cost = Price::parse_display(&rate.cost, currency).ok()?;
        Some(subtotal - discount + cost)
    });
    computed.map_or_else(|| state.totals.total.clone(), |total| total.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(id: &str, cost: &str) -> ShippingRate {
        ShippingRate {
            id: id.to_string(),
            label: id.to_string(),
            cost: cost.to_string(),
        }
    }

    fn cart(subtotal: &str, discount: &str, rates: Vec<ShippingRate>) -> Cart {
        Cart {
            items: vec![crate::commerce::CartItem {
                key: "k".to_string(),
                product_id: copperleaf_core::ProductId::new(1),
                name: "Kyusu".to_string(),
                unit_price_display: subtotal.to_string(),
                quantity: 1,
                image_url: None,
                line_total: subtotal.to_string(),
            }],
            totals: CartTotals {
                subtotal: subtotal.to_string(),
                shipping_total: "$0.00".to_string(),
                discount_total: discount.to_string(),
                total: subtotal.to_string(),
            },
            applied_coupons: vec![],
            shipping_rates: rates,
            chosen_shipping_rate: None,
        }
    }

    fn gateway(id: &str) -> PaymentGateway {
        PaymentGateway {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
        }
    }

    fn ready(cart: Cart) -> CheckoutState {
        reduce(
            CheckoutState::new(CurrencyCode::USD),
            CheckoutAction::Initialized {
                cart,
                gateways: vec![gateway("stripe"), gateway("cod")],
            },
        )
    }

    #[test]
    fn test_empty_cart_is_terminal() {
        let state = ready(Cart::default());
        assert_eq!(state.phase, CheckoutPhase::EmptyCart);
    }

    #[test]
    fn test_initialize_selects_first_rate_and_gateway() {
        let state = ready(cart("$49.99", "$0.00", vec![rate("a", "10.00"), rate("b", "0.00")]));
        assert_eq!(state.phase, CheckoutPhase::Ready);
        assert_eq!(state.selected_rate.as_deref(), Some("a"));
        assert_eq!(state.payment_method.as_deref(), Some("stripe"));
    }

    #[test]
    fn test_initialize_prefers_backend_chosen_rate() {
        let mut c = cart("$49.99", "$0.00", vec![rate("a", "10.00"), rate("b", "0.00")]);
        c.chosen_shipping_rate = Some("b".to_string());
        assert_eq!(ready(c).selected_rate.as_deref(), Some("b"));
    }

    #[test]
    fn test_displayed_total_is_subtotal_minus_discount_plus_rate() {
        let state = ready(cart("$49.99", "$0.00", vec![rate("flat", "10.00")]));
        assert_eq!(state.displayed_total, "$59.99");

        let state = ready(cart("$49.99", "$5.00", vec![rate("flat", "10.00")]));
        assert_eq!(state.displayed_total, "$54.99");
    }

    #[test]
    fn test_refresh_keeps_previous_rate_when_present() {
        let state = ready(cart("$20.00", "$0.00", vec![rate("a", "5.00"), rate("b", "7.00")]));
        let state = reduce(state, CheckoutAction::ShippingRateSelected("b".to_string()));
        let state = reduce(
            state,
            CheckoutAction::CartRefreshed(cart(
                "$20.00",
                "$0.00",
                vec![rate("c", "1.00"), rate("b", "7.00")],
            )),
        );
        assert_eq!(state.selected_rate.as_deref(), Some("b"));
        assert_eq!(state.displayed_total, "$27.00");
    }

    #[test]
    fn test_refresh_falls_back_to_first_rate_when_previous_gone() {
        let state = ready(cart("$20.00", "$0.00", vec![rate("a", "5.00"), rate("b", "7.00")]));
        let state = reduce(state, CheckoutAction::ShippingRateSelected("b".to_string()));
        let state = reduce(
            state,
            CheckoutAction::CartRefreshed(cart(
                "$20.00",
                "$0.00",
                vec![rate("c", "1.00"), rate("d", "2.00")],
            )),
        );
        assert_eq!(state.selected_rate.as_deref(), Some("c"));

        let state = reduce(
            state,
            CheckoutAction::CartRefreshed(cart("$20.00", "$0.00", vec![])),
        );
        assert!(state.selected_rate.is_none());
        assert_eq!(state.displayed_total, "$20.00");
    }

    #[test]
    fn test_payment_method_change_bumps_epoch_only_on_change() {
        let state = ready(cart("$20.00", "$0.00", vec![rate("a", "5.00")]));
        let epoch = state.payment_epoch;
        let state = reduce(state, CheckoutAction::PaymentMethodSelected("stripe".to_string()));
        assert_eq!(state.payment_epoch, epoch);
        let billing = state.billing.clone();
        let state = reduce(state, CheckoutAction::PaymentMethodSelected("cod".to_string()));
        assert_eq!(state.payment_epoch, epoch + 1);
        assert_eq!(state.billing, billing);
    }

    #[test]
    fn test_order_failure_returns_to_ready_with_notification() {
        let state = ready(cart("$20.00", "$0.00", vec![rate("a", "5.00")]));
        let state = reduce(state, CheckoutAction::OrderSubmitted);
        assert_eq!(state.phase, CheckoutPhase::Submitting);
        assert!(state.loading.order);

        let state = reduce(state, CheckoutAction::OrderFailed("Declined".to_string()));
        assert_eq!(state.phase, CheckoutPhase::Ready);
        assert!(!state.loading.order);
        assert_eq!(state.notifications, vec![Notification::error("Declined")]);
    }

    #[test]
    fn test_address_edits_and_effective_shipping() {
        let state = ready(cart("$20.00", "$0.00", vec![]));
        let state = reduce(
            state,
            CheckoutAction::BillingEdited(AddressPatch {
                city: Some("Perth".to_string()),
                ..AddressPatch::default()
            }),
        );
        assert_eq!(state.effective_shipping().city, "Perth");

        let state = reduce(state, CheckoutAction::ShipToDifferentAddressSet(true));
        let state = reduce(
            state,
            CheckoutAction::ShippingEdited(AddressPatch {
                city: Some("Darwin".to_string()),
                ..AddressPatch::default()
            }),
        );
        assert_eq!(state.effective_shipping().city, "Darwin");
        assert_eq!(state.billing.city, "Perth");
    }

    #[test]
    fn test_superseded_recalculation_keeps_shipping_loading() {
        let state = ready(cart("$20.00", "$0.00", vec![]));
        let state = reduce(state, CheckoutAction::RecalculationScheduled);
        let first = state.recalculation;
        let state = reduce(state, CheckoutAction::RecalculationScheduled);
        let second = state.recalculation;
        assert_ne!(first, second);

        let state = reduce(state, CheckoutAction::RecalculationFinished(first));
        assert!(state.loading.shipping);

        let state = reduce(
            state,
            CheckoutAction::RecalculationFailed {
                generation: first,
                message: "Down".to_string(),
            },
        );
        assert!(state.loading.shipping);
        assert_eq!(state.notifications, vec![Notification::error("Down")]);

        let state = reduce(state, CheckoutAction::RecalculationFinished(second));
        assert!(!state.loading.shipping);
    }

    #[test]
    fn test_reset_keeps_recalculation_generation() {
        let state = reduce(CheckoutState::default(), CheckoutAction::RecalculationScheduled);
        let generation = state.recalculation;
        let state = reduce(state, CheckoutAction::Reset);
        assert_eq!(state.recalculation, generation);
        assert!(!state.loading.shipping);
    }
}
