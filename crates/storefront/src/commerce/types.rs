//! Domain types returned by the commerce backend.
//!
//! These are the storefront's own types; GraphQL response shapes are
//! converted into them in `conversions` and never leak past this module.

use copperleaf_core::{OrderId, OrderKey, OrderStatus, ProductId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog
// =============================================================================

/// A product image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub alt_text: Option<String>,
}

/// Product listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    /// Display price as formatted by the backend (e.g. `"$24.00"`).
    pub price: String,
    pub regular_price: Option<String>,
    pub on_sale: bool,
    pub image: Option<Image>,
    pub short_description: Option<String>,
    pub stock_status: Option<String>,
}

/// Cursor pagination info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// A page of products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductConnection {
    pub products: Vec<ProductSummary>,
    pub page_info: PageInfo,
}

/// Filters for a product listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    pub first: u32,
    pub after: Option<String>,
    /// Category slug.
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ProductQuery {
    /// Largest page size the backend is asked for.
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.first.clamp(1, Self::MAX_PAGE_SIZE)
    }

    /// Free-text search with surrounding whitespace removed, if any remains.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            first: 12,
            after: None,
            category: None,
            search: None,
        }
    }
}

/// A product review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub author: String,
    pub content: String,
    pub rating: Option<u8>,
    pub date: Option<String>,
}

/// Full product page data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub summary: ProductSummary,
    pub description: Option<String>,
    pub gallery: Vec<Image>,
    pub average_rating: f64,
    pub review_count: u32,
    pub reviews: Vec<Review>,
    pub related: Vec<ProductSummary>,
}

// =============================================================================
// Cart
// =============================================================================

/// A cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Backend line key, unique within the cart.
    pub key: String,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price_display: String,
    /// Always at least 1; a line with zero quantity is removed instead.
    pub quantity: u32,
    pub image_url: Option<String>,
    pub line_total: String,
}

/// Cart aggregates as display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: String,
    pub shipping_total: String,
    pub discount_total: String,
    pub total: String,
}

/// A coupon applied to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_amount: String,
}

/// An available shipping rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub id: String,
    pub label: String,
    /// Numeric string, e.g. `"10.00"`.
    pub cost: String,
}

/// The backend session cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
    pub applied_coupons: Vec<AppliedCoupon>,
    pub shipping_rates: Vec<ShippingRate>,
    /// Rate the backend currently has selected for the session.
    pub chosen_shipping_rate: Option<String>,
}

impl Cart {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    #[must_use]
    pub fn item(&self, key: &str) -> Option<&CartItem> {
        self.items.iter().find(|item| item.key == key)
    }

    /// The line holding `product_id`, if any.
    #[must_use]
    pub fn item_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// A billing or shipping address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub email: String,
    pub phone: String,
}

/// A partial address edit; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AddressPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl AddressPatch {
    /// Apply the set fields onto `address`.
    pub fn apply_to(&self, address: &mut Address) {
        let fields = [
            (&self.first_name, &mut address.first_name),
            (&self.last_name, &mut address.last_name),
            (&self.address1, &mut address.address1),
            (&self.city, &mut address.city),
            (&self.state, &mut address.state),
            (&self.postcode, &mut address.postcode),
            (&self.email, &mut address.email),
            (&self.phone, &mut address.phone),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
    }

    /// Whether the edit touches a field that affects shipping rates or taxes.
    #[must_use]
    pub const fn affects_rates(&self) -> bool {
        self.address1.is_some()
            || self.city.is_some()
            || self.state.is_some()
            || self.postcode.is_some()
    }
}

/// A payment gateway enabled in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentGateway {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

/// Customer details sent before rates are recalculated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub billing: Address,
    /// `None` ships to the billing address.
    pub shipping: Option<Address>,
}

/// Order metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

/// Everything needed to create an order from the session cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInput {
    pub billing: Address,
    pub shipping: Address,
    pub ship_to_different_address: bool,
    pub payment_method: String,
    pub shipping_method: Option<String>,
    pub customer_note: Option<String>,
    pub transaction_id: Option<String>,
    /// Mark the order paid at creation (payment already captured).
    pub is_paid: bool,
    pub meta_data: Vec<MetaEntry>,
}

// =============================================================================
// Orders
// =============================================================================

/// Result of creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    #[serde(skip)]
    pub order_key: OrderKey,
    /// Backend checkout result, `"success"` when the order was created.
    pub result: String,
    pub redirect: Option<String>,
}

/// A line on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub quantity: u32,
    pub total: String,
}

/// An order as shown on the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(skip)]
    pub key: OrderKey,
    pub order_number: String,
    pub status: OrderStatus,
    pub date: Option<String>,
    pub items: Vec<OrderLine>,
    pub subtotal: String,
    pub shipping_total: String,
    pub discount_total: String,
    pub total: String,
    pub payment_method_title: Option<String>,
    pub transaction_id: Option<String>,
    pub billing: Address,
    pub shipping: Address,
    pub customer_note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, product: i64, quantity: u32) -> CartItem {
        CartItem {
            key: key.to_string(),
            product_id: ProductId::new(product),
            name: format!("Product {product}"),
            unit_price_display: "$10.00".to_string(),
            quantity,
            image_url: None,
            line_total: "$10.00".to_string(),
        }
    }

    #[test]
    fn test_cart_lookup_and_count() {
        let cart = Cart {
            items: vec![item("a", 1, 2), item("b", 2, 3)],
            ..Cart::default()
        };
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.item("b").map(|i| i.quantity), Some(3));
        assert_eq!(
            cart.item_for_product(ProductId::new(1)).map(|i| i.key.as_str()),
            Some("a")
        );
        assert!(cart.item_for_product(ProductId::new(9)).is_none());
    }

    #[test]
    fn test_address_patch_applies_only_set_fields() {
        let mut address = Address {
            first_name: "Ada".to_string(),
            city: "Perth".to_string(),
            ..Address::default()
        };
        let patch = AddressPatch {
            city: Some("Hobart".to_string()),
            ..AddressPatch::default()
        };
        patch.apply_to(&mut address);
        assert_eq!(address.first_name, "Ada");
        assert_eq!(address.city, "Hobart");
        assert!(patch.affects_rates());
        assert!(
            !AddressPatch {
                email: Some("a@b.co".to_string()),
                ..AddressPatch::default()
            }
            .affects_rates()
        );
    }

    #[test]
    fn test_product_query_page_size_clamped() {
        let query = ProductQuery {
            first: 500,
            ..ProductQuery::default()
        };
        assert_eq!(query.page_size(), ProductQuery::MAX_PAGE_SIZE);
        let query = ProductQuery {
            first: 0,
            search: Some("  ".to_string()),
            ..ProductQuery::default()
        };
        assert_eq!(query.page_size(), 1);
        assert!(query.search_term().is_none());
    }
}
