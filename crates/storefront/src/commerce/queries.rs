//! GraphQL operations against the WooGraphQL-compatible backend schema.
//!
//! Each operation is a unit struct implementing [`GraphQLQuery`] plus a
//! snake_case module holding its `Variables` and `ResponseData`, the same
//! layout `graphql_client`'s derive generates. Documents are assembled with
//! `concat!` from the shared selection-set macros below.

use graphql_client::{GraphQLQuery, QueryBody};
use serde::{Deserialize, Serialize};

macro_rules! graphql_operation {
    ($name:ident, $module:ident, $operation:literal, $document:expr) => {
        pub struct $name;

        impl GraphQLQuery for $name {
            type Variables = $module::Variables;
            type ResponseData = $module::ResponseData;

            fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
                QueryBody {
                    variables,
                    query: $document,
                    operation_name: $operation,
                }
            }
        }
    };
}

// =============================================================================
// Selection sets
// =============================================================================

macro_rules! product_fields {
    () => {
        "databaseId slug name onSale shortDescription \
         image { sourceUrl altText } \
         ... on SimpleProduct { price regularPrice stockStatus } \
         ... on VariableProduct { price regularPrice stockStatus }"
    };
}

macro_rules! cart_fields {
    () => {
        "contents(first: 100) { nodes { key quantity total \
           product { node { databaseId name image { sourceUrl } \
             ... on SimpleProduct { price } ... on VariableProduct { price } } } } } \
         subtotal shippingTotal discountTotal total \
         appliedCoupons { code discountAmount } \
         chosenShippingMethods \
         availableShippingMethods { rates { id label cost } }"
    };
}

macro_rules! address_fields {
    () => {
        "firstName lastName address1 city state postcode email phone"
    };
}

macro_rules! order_fields {
    () => {
        concat!(
            "databaseId orderKey orderNumber status date \
             subtotal shippingTotal discountTotal total \
             paymentMethodTitle transactionId customerNote \
             lineItems { nodes { quantity total product { node { name } } } } \
             billing { ",
            address_fields!(),
            " } shipping { ",
            address_fields!(),
            " }"
        )
    };
}

// =============================================================================
// Shared response shapes
// =============================================================================

pub mod shapes {
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ImageNode {
        pub source_url: Option<String>,
        pub alt_text: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProductNode {
        pub database_id: i64,
        pub slug: Option<String>,
        pub name: Option<String>,
        #[serde(default)]
        pub on_sale: bool,
        pub short_description: Option<String>,
        pub image: Option<ImageNode>,
        pub price: Option<String>,
        pub regular_price: Option<String>,
        pub stock_status: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PageInfo {
        pub has_next_page: bool,
        pub end_cursor: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Nodes<T> {
        pub nodes: Vec<T>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Edge<T> {
        pub node: T,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CartProductNode {
        pub database_id: i64,
        pub name: Option<String>,
        pub image: Option<ImageNode>,
        pub price: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct CartItemNode {
        pub key: String,
        pub quantity: Option<i64>,
        pub total: Option<String>,
        pub product: Option<Edge<CartProductNode>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CouponNode {
        pub code: String,
        pub discount_amount: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct RateNode {
        pub id: String,
        pub label: Option<String>,
        pub cost: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ShippingPackage {
        #[serde(default)]
        pub rates: Option<Vec<RateNode>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CartNode {
        pub contents: Option<Nodes<CartItemNode>>,
        pub subtotal: Option<String>,
        pub shipping_total: Option<String>,
        pub discount_total: Option<String>,
        pub total: Option<String>,
        pub applied_coupons: Option<Vec<CouponNode>>,
        pub chosen_shipping_methods: Option<Vec<Option<String>>>,
        pub available_shipping_methods: Option<Vec<ShippingPackage>>,
    }

    /// Wrapper for mutation payloads that return the updated cart.
    #[derive(Debug, Clone, Deserialize)]
    pub struct CartPayload {
        pub cart: Option<CartNode>,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct AddressNode {
        pub first_name: Option<String>,
        pub last_name: Option<String>,
        pub address1: Option<String>,
        pub city: Option<String>,
        pub state: Option<String>,
        pub postcode: Option<String>,
        pub email: Option<String>,
        pub phone: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct NamedNode {
        pub name: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct LineItemNode {
        pub quantity: Option<i64>,
        pub total: Option<String>,
        pub product: Option<Edge<NamedNode>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct OrderNode {
        pub database_id: i64,
        pub order_key: Option<String>,
        pub order_number: Option<String>,
        pub status: Option<copperleaf_core::OrderStatus>,
        pub date: Option<String>,
        pub subtotal: Option<String>,
        pub shipping_total: Option<String>,
        pub discount_total: Option<String>,
        pub total: Option<String>,
        pub payment_method_title: Option<String>,
        pub transaction_id: Option<String>,
        pub customer_note: Option<String>,
        pub line_items: Option<Nodes<LineItemNode>>,
        pub billing: Option<AddressNode>,
        pub shipping: Option<AddressNode>,
    }

    /// Address input for customer and checkout mutations.
    pub type AddressInput = AddressNode;

    #[derive(Debug, Clone, Serialize)]
    pub struct MetaDataInput {
        pub key: String,
        pub value: String,
    }
}

// =============================================================================
// Catalog
// =============================================================================

graphql_operation!(
    GetProducts,
    get_products,
    "GetProducts",
    concat!(
        "query GetProducts($first: Int, $after: String, $where: RootQueryToProductUnionConnectionWhereArgs) { \
         products(first: $first, after: $after, where: $where) { \
         pageInfo { hasNextPage endCursor } nodes { ",
        product_fields!(),
        " } } }"
    )
);

pub mod get_products {
    use super::shapes::{PageInfo, ProductNode};
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub first: i64,
        pub after: Option<String>,
        #[serde(rename = "where")]
        pub filter: Filter,
    }

    #[derive(Debug, Clone, Default, Serialize)]
    pub struct Filter {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub search: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Products {
        pub page_info: PageInfo,
        pub nodes: Vec<ProductNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub products: Option<Products>,
    }
}

graphql_operation!(
    GetProductBySlug,
    get_product_by_slug,
    "GetProductBySlug",
    concat!(
        "query GetProductBySlug($slug: ID!) { \
         product(id: $slug, idType: SLUG) { ",
        product_fields!(),
        " description galleryImages { nodes { sourceUrl altText } } \
         averageRating reviewCount \
         reviews(first: 20) { edges { rating node { id content date author { node { name } } } } } \
         related(first: 4) { nodes { ",
        product_fields!(),
        " } } } }"
    )
);

pub mod get_product_by_slug {
    use super::shapes::{Edge, ImageNode, NamedNode, Nodes, ProductNode};
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub slug: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ReviewNode {
        pub id: String,
        pub content: Option<String>,
        pub date: Option<String>,
        pub author: Option<Edge<NamedNode>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ReviewEdge {
        pub rating: Option<f64>,
        pub node: ReviewNode,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Reviews {
        pub edges: Vec<ReviewEdge>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProductDetailNode {
        #[serde(flatten)]
        pub product: ProductNode,
        pub description: Option<String>,
        pub gallery_images: Option<Nodes<ImageNode>>,
        pub average_rating: Option<f64>,
        pub review_count: Option<i64>,
        pub reviews: Option<Reviews>,
        pub related: Option<Nodes<ProductNode>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub product: Option<ProductDetailNode>,
    }
}

// =============================================================================
// Cart
// =============================================================================

graphql_operation!(
    GetCart,
    get_cart,
    "GetCart",
    concat!("query GetCart { cart { ", cart_fields!(), " } }")
);

pub mod get_cart {
    use super::shapes::CartNode;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables;

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub cart: Option<CartNode>,
    }
}

graphql_operation!(
    AddToCart,
    add_to_cart,
    "AddToCart",
    concat!(
        "mutation AddToCart($productId: Int!, $quantity: Int) { \
         addToCart(input: { productId: $productId, quantity: $quantity }) { cart { ",
        cart_fields!(),
        " } } }"
    )
);

pub mod add_to_cart {
    use super::shapes::CartPayload;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub product_id: i64,
        pub quantity: i64,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub add_to_cart: Option<CartPayload>,
    }
}

graphql_operation!(
    UpdateItemQuantities,
    update_item_quantities,
    "UpdateItemQuantities",
    concat!(
        "mutation UpdateItemQuantities($items: [CartItemQuantityInput]) { \
         updateItemQuantities(input: { items: $items }) { cart { ",
        cart_fields!(),
        " } } }"
    )
);

pub mod update_item_quantities {
    use super::shapes::CartPayload;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct ItemQuantity {
        pub key: String,
        pub quantity: i64,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub items: Vec<ItemQuantity>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub update_item_quantities: Option<CartPayload>,
    }
}

graphql_operation!(
    RemoveItemsFromCart,
    remove_items_from_cart,
    "RemoveItemsFromCart",
    concat!(
        "mutation RemoveItemsFromCart($keys: [ID], $all: Boolean) { \
         removeItemsFromCart(input: { keys: $keys, all: $all }) { cart { ",
        cart_fields!(),
        " } } }"
    )
);

pub mod remove_items_from_cart {
    use super::shapes::CartPayload;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub keys: Vec<String>,
        pub all: bool,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub remove_items_from_cart: Option<CartPayload>,
    }
}

// =============================================================================
// Checkout
// =============================================================================

graphql_operation!(
    UpdateCustomer,
    update_customer,
    "UpdateCustomer",
    "mutation UpdateCustomer($billing: CustomerAddressInput, $shipping: CustomerAddressInput, $shippingSameAsBilling: Boolean) { \
     updateCustomer(input: { billing: $billing, shipping: $shipping, shippingSameAsBilling: $shippingSameAsBilling }) { \
     customer { id } } }"
);

pub mod update_customer {
    use super::shapes::AddressInput;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub billing: AddressInput,
        pub shipping: AddressInput,
        pub shipping_same_as_billing: bool,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct CustomerId {
        pub id: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Payload {
        pub customer: Option<CustomerId>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub update_customer: Option<Payload>,
    }
}

graphql_operation!(
    UpdateShippingMethod,
    update_shipping_method,
    "UpdateShippingMethod",
    concat!(
        "mutation UpdateShippingMethod($shippingMethods: [String]) { \
         updateShippingMethod(input: { shippingMethods: $shippingMethods }) { cart { ",
        cart_fields!(),
        " } } }"
    )
);

pub mod update_shipping_method {
    use super::shapes::CartPayload;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub shipping_methods: Vec<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub update_shipping_method: Option<CartPayload>,
    }
}

graphql_operation!(
    ApplyCoupon,
    apply_coupon,
    "ApplyCoupon",
    "mutation ApplyCoupon($code: String!) { \
     applyCoupon(input: { code: $code }) { applied { code discountAmount } } }"
);

pub mod apply_coupon {
    use super::shapes::CouponNode;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub code: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Payload {
        pub applied: Option<CouponNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub apply_coupon: Option<Payload>,
    }
}

graphql_operation!(
    RemoveCoupons,
    remove_coupons,
    "RemoveCoupons",
    "mutation RemoveCoupons($codes: [String]) { \
     removeCoupons(input: { codes: $codes }) { cart { appliedCoupons { code } } } }"
);

pub mod remove_coupons {
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub codes: Vec<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub remove_coupons: Option<serde_json::Value>,
    }
}

graphql_operation!(
    GetPaymentGateways,
    get_payment_gateways,
    "GetPaymentGateways",
    "query GetPaymentGateways { paymentGateways { nodes { id title description } } }"
);

pub mod get_payment_gateways {
    use super::shapes::Nodes;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables;

    #[derive(Debug, Clone, Deserialize)]
    pub struct GatewayNode {
        pub id: String,
        pub title: Option<String>,
        pub description: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub payment_gateways: Option<Nodes<GatewayNode>>,
    }
}

graphql_operation!(
    Checkout,
    checkout,
    "Checkout",
    "mutation Checkout($input: CheckoutInput!) { \
     checkout(input: $input) { result redirect order { databaseId orderKey } } }"
);

pub mod checkout {
    use super::shapes::{AddressInput, MetaDataInput};
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Input {
        pub billing: AddressInput,
        pub shipping: AddressInput,
        pub ship_to_different_address: bool,
        pub payment_method: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub shipping_method: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub customer_note: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub transaction_id: Option<String>,
        pub is_paid: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub meta_data: Vec<MetaDataInput>,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub input: Input,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CreatedOrder {
        pub database_id: i64,
        pub order_key: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Payload {
        pub result: Option<String>,
        pub redirect: Option<String>,
        pub order: Option<CreatedOrder>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub checkout: Option<Payload>,
    }
}

// =============================================================================
// Orders
// =============================================================================

graphql_operation!(
    GetOrder,
    get_order,
    "GetOrder",
    concat!(
        "query GetOrder($id: ID!) { order(id: $id, idType: DATABASE_ID) { ",
        order_fields!(),
        " } }"
    )
);

pub mod get_order {
    use super::shapes::OrderNode;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    pub struct Variables {
        pub id: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub order: Option<OrderNode>,
    }
}

graphql_operation!(
    UpdateOrder,
    update_order,
    "UpdateOrder",
    concat!(
        "mutation UpdateOrder($id: ID!, $status: OrderStatusEnum, $transactionId: String, $isPaid: Boolean) { \
         updateOrder(input: { id: $id, status: $status, transactionId: $transactionId, isPaid: $isPaid }) { order { ",
        order_fields!(),
        " } } }"
    )
);

pub mod update_order {
    use super::shapes::OrderNode;
    use super::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub id: String,
        pub status: copperleaf_core::OrderStatus,
        pub transaction_id: String,
        pub is_paid: bool,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Payload {
        pub order: Option<OrderNode>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub update_order: Option<Payload>,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_name_their_operation() {
        let body = GetCart::build_query(get_cart::Variables);
        assert_eq!(body.operation_name, "GetCart");
        assert!(body.query.starts_with("query GetCart"));
        assert!(body.query.contains("availableShippingMethods"));

        let body = UpdateOrder::build_query(update_order::Variables {
            id: "7".to_string(),
            status: copperleaf_core::OrderStatus::Processing,
            transaction_id: "pi_1".to_string(),
            is_paid: true,
        });
        assert!(body.query.contains("billing { firstName"));
    }

    #[test]
    fn test_checkout_input_serializes_camel_case() {
        let input = checkout::Input {
            billing: shapes::AddressInput::default(),
            shipping: shapes::AddressInput::default(),
            ship_to_different_address: false,
            payment_method: "cod".to_string(),
            shipping_method: vec!["flat_rate:1".to_string()],
            customer_note: None,
            transaction_id: None,
            is_paid: false,
            meta_data: vec![],
        };
        let json = serde_json::to_value(checkout::Variables { input }).unwrap();
        assert_eq!(json["input"]["paymentMethod"], "cod");
        assert_eq!(json["input"]["shippingMethod"][0], "flat_rate:1");
        assert!(json["input"].get("metaData").is_none());
        assert!(json["input"].get("customerNote").is_none());
    }

    #[test]
    fn test_product_filter_omits_unset_fields() {
        let vars = get_products::Variables {
            first: 12,
            after: None,
            filter: get_products::Filter {
                category: Some("tea".to_string()),
                search: None,
            },
        };
        let json = serde_json::to_value(vars).unwrap();
        assert_eq!(json["where"]["category"], "tea");
        assert!(json["where"].get("search").is_none());
    }
}
