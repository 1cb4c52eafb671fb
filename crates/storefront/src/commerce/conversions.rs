//! Conversions from GraphQL response shapes to storefront types.

use copperleaf_core::{OrderId, OrderKey, ProductId};
use tracing::warn;

use super::queries::get_payment_gateways::GatewayNode;
use super::queries::get_product_by_slug::ProductDetailNode;
use super::queries::shapes::{
    AddressInput, AddressNode, CartItemNode, CartNode, ImageNode, OrderNode, ProductNode,
};
use super::types::{
    Address, AppliedCoupon, Cart, CartItem, CartTotals, Image, Order, OrderLine, PaymentGateway,
    ProductDetail, ProductSummary, Review, ShippingRate,
};

fn convert_image(image: ImageNode) -> Option<Image> {
    image.source_url.map(|url| Image {
        url,
        alt_text: image.alt_text.filter(|alt| !alt.is_empty()),
    })
}

pub fn convert_product_summary(node: ProductNode) -> ProductSummary {
    ProductSummary {
        id: ProductId::new(node.database_id),
        slug: node.slug.unwrap_or_default(),
        name: node.name.unwrap_or_default(),
        price: node.price.unwrap_or_default(),
        regular_price: node.regular_price,
        on_sale: node.on_sale,
        image: node.image.and_then(convert_image),
        short_description: node.short_description,
        stock_status: node.stock_status,
    }
}

pub fn convert_product_detail(node: ProductDetailNode) -> ProductDetail {
    let reviews = node
        .reviews
        .map(|reviews| {
            reviews
                .edges
                .into_iter()
                .map(|edge| Review {
                    id: edge.node.id,
                    author: edge
                        .node
                        .author
                        .and_then(|a| a.node.name)
                        .unwrap_or_else(|| "Anonymous".to_string()),
                    content: edge.node.content.unwrap_or_default(),
                    rating: edge.rating.map(rating_stars),
                    date: edge.node.date,
                })
                .collect()
        })
        .unwrap_or_default();

    ProductDetail {
        summary: convert_product_summary(node.product),
        description: node.description,
        gallery: node
            .gallery_images
            .map(|g| g.nodes.into_iter().filter_map(convert_image).collect())
            .unwrap_or_default(),
        average_rating: node.average_rating.unwrap_or_default(),
        review_count: node
            .review_count
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or_default(),
        reviews,
        related: node
            .related
            .map(|r| r.nodes.into_iter().map(convert_product_summary).collect())
            .unwrap_or_default(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rating_stars(rating: f64) -> u8 {
    rating.round().clamp(0.0, 5.0) as u8
}

fn convert_cart_item(node: CartItemNode) -> Option<CartItem> {
    let Some(product) = node.product.map(|p| p.node) else {
        warn!(key = %node.key, "Cart line without product, skipping");
        return None;
    };
    let quantity = node
        .quantity
        .and_then(|q| u32::try_from(q).ok())
        .filter(|q| *q > 0)?;

    Some(CartItem {
        key: node.key,
        product_id: ProductId::new(product.database_id),
        name: product.name.unwrap_or_default(),
        unit_price_display: product.price.unwrap_or_default(),
        quantity,
        image_url: product.image.and_then(|i| i.source_url),
        line_total: node.total.unwrap_or_default(),
    })
}

pub fn convert_cart(node: CartNode) -> Cart {
    let items = node
        .contents
        .map(|c| c.nodes.into_iter().filter_map(convert_cart_item).collect())
        .unwrap_or_default();

    let shipping_rates = node
        .available_shipping_methods
        .unwrap_or_default()
        .into_iter()
        .flat_map(|package| package.rates.unwrap_or_default())
        .map(|rate| ShippingRate {
            label: rate.label.unwrap_or_else(|| rate.id.clone()),
            cost: rate.cost.unwrap_or_else(|| "0.00".to_string()),
            id: rate.id,
        })
        .collect();

    Cart {
        items,
        totals: CartTotals {
            subtotal: node.subtotal.unwrap_or_default(),
            shipping_total: node.shipping_total.unwrap_or_default(),
            discount_total: node.discount_total.unwrap_or_default(),
            total: node.total.unwrap_or_default(),
        },
        applied_coupons: node
            .applied_coupons
            .unwrap_or_default()
            .into_iter()
            .map(|c| AppliedCoupon {
                code: c.code,
                discount_amount: c.discount_amount.unwrap_or_default(),
            })
            .collect(),
        shipping_rates,
        chosen_shipping_rate: node
            .chosen_shipping_methods
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .next(),
    }
}

pub fn convert_gateway(node: GatewayNode) -> PaymentGateway {
    PaymentGateway {
        title: node.title.unwrap_or_else(|| node.id.clone()),
        id: node.id,
        description: node.description.filter(|d| !d.is_empty()),
    }
}

fn convert_address(node: AddressNode) -> Address {
    Address {
        first_name: node.first_name.unwrap_or_default(),
        last_name: node.last_name.unwrap_or_default(),
        address1: node.address1.unwrap_or_default(),
        city: node.city.unwrap_or_default(),
        state: node.state.unwrap_or_default(),
        postcode: node.postcode.unwrap_or_default(),
        email: node.email.unwrap_or_default(),
        phone: node.phone.unwrap_or_default(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn address_input(address: &Address) -> AddressInput {
    AddressInput {
        first_name: non_empty(&address.first_name),
        last_name: non_empty(&address.last_name),
        address1: non_empty(&address.address1),
        city: non_empty(&address.city),
        state: non_empty(&address.state),
        postcode: non_empty(&address.postcode),
        email: non_empty(&address.email),
        phone: non_empty(&address.phone),
    }
}

/// Convert an order; the key is kept on the value for authorization.
pub fn convert_order(node: OrderNode) -> Order {
    let id = OrderId::new(node.database_id);
    Order {
        id,
        key: OrderKey::new(node.order_key.unwrap_or_default()),
        order_number: node.order_number.unwrap_or_else(|| id.to_string()),
        status: node.status.unwrap_or_default(),
        date: node.date,
        items: node
            .line_items
            .map(|l| {
                l.nodes
                    .into_iter()
                    .map(|line| OrderLine {
                        name: line
                            .product
                            .and_then(|p| p.node.name)
                            .unwrap_or_default(),
                        quantity: line
                            .quantity
                            .and_then(|q| u32::try_from(q).ok())
                            .unwrap_or_default(),
                        total: line.total.unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        subtotal: node.subtotal.unwrap_or_default(),
        shipping_total: node.shipping_total.unwrap_or_default(),
        discount_total: node.discount_total.unwrap_or_default(),
        total: node.total.unwrap_or_default(),
        payment_method_title: node.payment_method_title,
        transaction_id: node.transaction_id.filter(|t| !t.is_empty()),
        billing: node.billing.map(convert_address).unwrap_or_default(),
        shipping: node.shipping.map(convert_address).unwrap_or_default(),
        customer_note: node.customer_note.filter(|n| !n.is_empty()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_cart_flattens_rates_and_skips_orphans() {
        let node: CartNode = serde_json::from_value(serde_json::json!({
            "contents": { "nodes": [
                { "key": "k1", "quantity": 2, "total": "$20.00",
                  "product": { "node": { "databaseId": 11, "name": "Tea", "price": "$10.00",
                                         "image": { "sourceUrl": "https://img/tea.jpg" } } } },
                { "key": "k2", "quantity": 1, "total": "$5.00", "product": null }
            ]},
            "subtotal": "$20.00",
            "shippingTotal": "$0.00",
            "discountTotal": "$0.00",
            "total": "$20.00",
            "appliedCoupons": null,
            "chosenShippingMethods": [null, "flat_rate:1"],
            "availableShippingMethods": [
                { "rates": [ { "id": "flat_rate:1", "label": "Flat", "cost": "10.00" } ] },
                { "rates": [ { "id": "local_pickup:2", "label": null, "cost": null } ] }
            ]
        }))
        .unwrap();

        let cart = convert_cart(node);
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].product_id, ProductId::new(11));
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.shipping_rates.len(), 2);
        assert_eq!(cart.shipping_rates[1].label, "local_pickup:2");
        assert_eq!(cart.shipping_rates[1].cost, "0.00");
        assert_eq!(cart.chosen_shipping_rate.as_deref(), Some("flat_rate:1"));
    }

    #[test]
    fn test_address_input_drops_blank_fields() {
        let input = address_input(&Address {
            first_name: " Ada ".to_string(),
            city: "   ".to_string(),
            ..Address::default()
        });
        assert_eq!(input.first_name.as_deref(), Some("Ada"));
        assert!(input.city.is_none());
    }

    #[test]
    fn test_rating_stars_clamped() {
        assert_eq!(rating_stars(4.6), 5);
        assert_eq!(rating_stars(9.0), 5);
        assert_eq!(rating_stars(-1.0), 0);
    }
}
