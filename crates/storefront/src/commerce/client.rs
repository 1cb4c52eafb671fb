//! GraphQL implementation of [`CommerceBackend`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use copperleaf_core::{OrderId, OrderStatus, ProductId};
use graphql_client::{GraphQLQuery, Response};
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use crate::config::CommerceConfig;

use super::conversions::{
    address_input, convert_cart, convert_gateway, convert_order, convert_product_detail,
    convert_product_summary,
};
use super::queries::shapes::{CartPayload, MetaDataInput};
use super::queries::{
    AddToCart, ApplyCoupon, Checkout, GetCart, GetOrder, GetPaymentGateways, GetProductBySlug,
    GetProducts, RemoveCoupons, RemoveItemsFromCart, UpdateCustomer, UpdateItemQuantities,
    UpdateOrder, UpdateShippingMethod, add_to_cart, apply_coupon, checkout, get_cart, get_order,
    get_payment_gateways, get_product_by_slug, get_products, remove_coupons,
    remove_items_from_cart, update_customer, update_item_quantities, update_order,
    update_shipping_method,
};
use super::types::{
    AppliedCoupon, Cart, CheckoutInput, CustomerUpdate, Order, OrderResult, PageInfo,
    PaymentGateway, ProductConnection, ProductDetail, ProductQuery,
};
use super::{BackendSession, CommerceBackend, CommerceError, GraphQLError, GraphQLErrorLocation};

/// Header carrying the backend session token in both directions.
const SESSION_HEADER: &str = "woocommerce-session";

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(String),
    Products(ProductQuery),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<ProductDetail>),
    Products(ProductConnection),
}

/// How a request identifies itself to the backend.
#[derive(Clone, Copy)]
enum Caller<'a> {
    /// Catalog reads need no identity.
    Anonymous,
    /// Cart and checkout calls run in the shopper's backend session.
    Shopper(&'a BackendSession),
    /// Order reads and updates use the storefront's API token.
    Privileged,
}

// =============================================================================
// CatalogClient
// =============================================================================

/// Client for the commerce backend's GraphQL API.
///
/// Product reads are cached for 5 minutes; everything else goes to the
/// backend on every call.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<SecretString>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogClient {
    /// Create a new backend client.
    #[must_use]
    pub fn new(config: &CommerceConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogClientInner {
                client: reqwest::Client::new(),
                endpoint: config.graphql_url.clone(),
                api_token: config.api_token.clone(),
                cache,
            }),
        }
    }

    /// Execute a GraphQL operation.
    async fn execute<Q: GraphQLQuery>(
        &self,
        caller: Caller<'_>,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, CommerceError>
    where
        Q::Variables: serde::Serialize,
    {
        let request_body = Q::build_query(variables);

        let mut request = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("Content-Type", "application/json")
            .json(&request_body);

        match caller {
            Caller::Anonymous => {}
            Caller::Shopper(session) => {
                if let Some(token) = session.token().await {
                    request = request.header(SESSION_HEADER, format!("Session {token}"));
                }
            }
            Caller::Privileged => {
                let token = self.inner.api_token.as_ref().ok_or_else(|| {
                    CommerceError::Unauthorized("Order access is not configured".to_string())
                })?;
                request = request.bearer_auth(token.expose_secret());
            }
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CommerceError::RateLimited(retry_after));
        }

        // The backend may issue or rotate the session token on any response
        if let Caller::Shopper(session) = caller
            && let Some(token) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        {
            session.set_token(token).await;
        }

        let response_text = response.text().await?;

        let parsed: Result<Response<Q::ResponseData>, _> = serde_json::from_str(&response_text);

        if !status.is_success() {
            // GraphQL servers report resolver failures with 4xx/5xx and a normal body
            if let Ok(Response {
                errors: Some(errors),
                ..
            }) = parsed
                && !errors.is_empty()
            {
                return Err(CommerceError::GraphQL(convert_errors(errors)));
            }
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Commerce API returned non-success status"
            );
            return Err(CommerceError::Status {
                status: status.as_u16(),
                body: response_text.chars().take(200).collect(),
            });
        }

        let response = match parsed {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse commerce GraphQL response"
                );
                return Err(CommerceError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, "GraphQL errors in response");
            return Err(CommerceError::GraphQL(convert_errors(errors)));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                body = %response_text.chars().take(500).collect::<String>(),
                "Commerce GraphQL response has no data and no errors"
            );
            CommerceError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Order, CommerceError> {
        let data = self
            .execute::<GetOrder>(
                Caller::Privileged,
                get_order::Variables { id: id.to_string() },
            )
            .await?;

        data.order
            .map(convert_order)
            .ok_or_else(|| CommerceError::NotFound(format!("Order not found: {id}")))
    }
}

fn convert_errors(errors: Vec<graphql_client::Error>) -> Vec<GraphQLError> {
    errors
        .into_iter()
        .map(|e| GraphQLError {
            message: e.message,
            locations: e.locations.map_or_else(Vec::new, |locs| {
                locs.into_iter()
                    .map(|l| GraphQLErrorLocation {
                        line: i64::from(l.line),
                        column: i64::from(l.column),
                    })
                    .collect()
            }),
            path: e.path.map_or_else(Vec::new, |p| {
                p.into_iter()
                    .map(|fragment| match fragment {
                        graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                        graphql_client::PathFragment::Index(i) => {
                            serde_json::Value::Number(i.into())
                        }
                    })
                    .collect()
            }),
        })
        .collect()
}

fn cart_from_payload(payload: Option<CartPayload>) -> Result<Cart, CommerceError> {
    payload
        .and_then(|p| p.cart)
        .map(convert_cart)
        .ok_or_else(|| CommerceError::GraphQL(vec![GraphQLError::message("No cart in response")]))
}

#[async_trait]
impl CommerceBackend for CatalogClient {
    #[instrument(skip(self))]
    async fn products(&self, query: &ProductQuery) -> Result<ProductConnection, CommerceError> {
        let cacheable = query.search_term().is_none();
        let cache_key = CacheKey::Products(query.clone());

        if cacheable
            && let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let variables = get_products::Variables {
            first: i64::from(query.page_size()),
            after: query.after.clone(),
            filter: get_products::Filter {
                category: query.category.clone(),
                search: query.search_term().map(str::to_string),
            },
        };

        let data = self
            .execute::<GetProducts>(Caller::Anonymous, variables)
            .await?;

        let connection = data.products.map_or_else(ProductConnection::default, |p| {
            ProductConnection {
                products: p.nodes.into_iter().map(convert_product_summary).collect(),
                page_info: PageInfo {
                    has_next_page: p.page_info.has_next_page,
                    end_cursor: p.page_info.end_cursor,
                },
            }
        });

        if cacheable {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Products(connection.clone()))
                .await;
        }

        Ok(connection)
    }

    #[instrument(skip(self), fields(slug = %slug))]
    async fn product(&self, slug: &str) -> Result<ProductDetail, CommerceError> {
        let cache_key = CacheKey::Product(slug.to_string());

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let data = self
            .execute::<GetProductBySlug>(
                Caller::Anonymous,
                get_product_by_slug::Variables {
                    slug: slug.to_string(),
                },
            )
            .await?;

        let product = data
            .product
            .map(convert_product_detail)
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {slug}")))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    #[instrument(skip(self, session))]
    async fn cart(&self, session: &BackendSession) -> Result<Cart, CommerceError> {
        let data = self
            .execute::<GetCart>(Caller::Shopper(session), get_cart::Variables)
            .await?;
        Ok(data.cart.map(convert_cart).unwrap_or_default())
    }

    #[instrument(skip(self, session), fields(product_id = %product_id))]
    async fn add_item(
        &self,
        session: &BackendSession,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, CommerceError> {
        let data = self
            .execute::<AddToCart>(
                Caller::Shopper(session),
                add_to_cart::Variables {
                    product_id: product_id.get(),
                    quantity: i64::from(quantity),
                },
            )
            .await?;
        cart_from_payload(data.add_to_cart)
    }

    #[instrument(skip(self, session))]
    async fn update_item_quantity(
        &self,
        session: &BackendSession,
        key: &str,
        quantity: u32,
    ) -> Result<Cart, CommerceError> {
        let data = self
            .execute::<UpdateItemQuantities>(
                Caller::Shopper(session),
                update_item_quantities::Variables {
                    items: vec![update_item_quantities::ItemQuantity {
                        key: key.to_string(),
                        quantity: i64::from(quantity),
                    }],
                },
            )
            .await?;
        cart_from_payload(data.update_item_quantities)
    }

    #[instrument(skip(self, session))]
    async fn remove_items(
        &self,
        session: &BackendSession,
        keys: &[String],
    ) -> Result<Cart, CommerceError> {
        let data = self
            .execute::<RemoveItemsFromCart>(
                Caller::Shopper(session),
                remove_items_from_cart::Variables {
                    keys: keys.to_vec(),
                    all: false,
                },
            )
            .await?;
        cart_from_payload(data.remove_items_from_cart)
    }

    #[instrument(skip(self, session))]
    async fn empty_cart(&self, session: &BackendSession) -> Result<Cart, CommerceError> {
        let data = self
            .execute::<RemoveItemsFromCart>(
                Caller::Shopper(session),
                remove_items_from_cart::Variables {
                    keys: vec![],
                    all: true,
                },
            )
            .await?;
        cart_from_payload(data.remove_items_from_cart)
    }

    #[instrument(skip(self, session, update))]
    async fn update_customer(
        &self,
        session: &BackendSession,
        update: &CustomerUpdate,
    ) -> Result<(), CommerceError> {
        let billing = address_input(&update.billing);
        let shipping = update
            .shipping
            .as_ref()
            .map_or_else(|| billing.clone(), address_input);

        self.execute::<UpdateCustomer>(
            Caller::Shopper(session),
            update_customer::Variables {
                billing,
                shipping,
                shipping_same_as_billing: update.shipping.is_none(),
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn update_shipping_method(
        &self,
        session: &BackendSession,
        rate_id: &str,
    ) -> Result<Cart, CommerceError> {
        let data = self
            .execute::<UpdateShippingMethod>(
                Caller::Shopper(session),
                update_shipping_method::Variables {
                    shipping_methods: vec![rate_id.to_string()],
                },
            )
            .await?;
        cart_from_payload(data.update_shipping_method)
    }

    #[instrument(skip(self, session))]
    async fn apply_coupon(
        &self,
        session: &BackendSession,
        code: &str,
    ) -> Result<AppliedCoupon, CommerceError> {
        let data = self
            .execute::<ApplyCoupon>(
                Caller::Shopper(session),
                apply_coupon::Variables {
                    code: code.to_string(),
                },
            )
            .await?;

        data.apply_coupon
            .and_then(|p| p.applied)
            .map(|c| AppliedCoupon {
                code: c.code,
                discount_amount: c.discount_amount.unwrap_or_default(),
            })
            .ok_or_else(|| CommerceError::UserError(format!("Coupon \"{code}\" was not applied.")))
    }

    #[instrument(skip(self, session))]
    async fn remove_coupons(
        &self,
        session: &BackendSession,
        codes: &[String],
    ) -> Result<(), CommerceError> {
        self.execute::<RemoveCoupons>(
            Caller::Shopper(session),
            remove_coupons::Variables {
                codes: codes.to_vec(),
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn payment_gateways(
        &self,
        session: &BackendSession,
    ) -> Result<Vec<PaymentGateway>, CommerceError> {
        let data = self
            .execute::<GetPaymentGateways>(Caller::Shopper(session), get_payment_gateways::Variables)
            .await?;
        Ok(data
            .payment_gateways
            .map(|g| g.nodes.into_iter().map(convert_gateway).collect())
            .unwrap_or_default())
    }

    #[instrument(skip(self, session, input), fields(payment_method = %input.payment_method))]
    async fn create_order(
        &self,
        session: &BackendSession,
        input: &CheckoutInput,
    ) -> Result<OrderResult, CommerceError> {
        let variables = checkout::Variables {
            input: checkout::Input {
                billing: address_input(&input.billing),
                shipping: address_input(&input.shipping),
                ship_to_different_address: input.ship_to_different_address,
                payment_method: input.payment_method.clone(),
                shipping_method: input.shipping_method.iter().cloned().collect(),
                customer_note: input.customer_note.clone().filter(|n| !n.trim().is_empty()),
                transaction_id: input.transaction_id.clone(),
                is_paid: input.is_paid,
                meta_data: input
                    .meta_data
                    .iter()
                    .map(|m| MetaDataInput {
                        key: m.key.clone(),
                        value: m.value.clone(),
                    })
                    .collect(),
            },
        };

        let data = self
            .execute::<Checkout>(Caller::Shopper(session), variables)
            .await?;

        let payload = data
            .checkout
            .ok_or_else(|| CommerceError::UserError("The order could not be created.".to_string()))?;
        let order = payload
            .order
            .ok_or_else(|| CommerceError::UserError("The order could not be created.".to_string()))?;

        Ok(OrderResult {
            order_id: OrderId::new(order.database_id),
            order_key: copperleaf_core::OrderKey::new(order.order_key.unwrap_or_default()),
            result: payload.result.unwrap_or_else(|| "success".to_string()),
            redirect: payload.redirect,
        })
    }

    #[instrument(skip(self, key), fields(order_id = %id))]
    async fn order(&self, id: OrderId, key: &str) -> Result<Order, CommerceError> {
        let order = self.fetch_order(id).await?;
        if !order.key.matches(key) {
            return Err(CommerceError::Unauthorized(
                "Order key does not match".to_string(),
            ));
        }
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn finalize_order(
        &self,
        id: OrderId,
        transaction_id: &str,
    ) -> Result<Order, CommerceError> {
        let current = self.fetch_order(id).await?;
        if current.status.is_paid() {
            debug!("Order already paid, nothing to finalize");
            return Ok(current);
        }

        let data = self
            .execute::<UpdateOrder>(
                Caller::Privileged,
                update_order::Variables {
                    id: id.to_string(),
                    status: OrderStatus::Processing,
                    transaction_id: transaction_id.to_string(),
                    is_paid: true,
                },
            )
            .await?;

        data.update_order
            .and_then(|p| p.order)
            .map(convert_order)
            .ok_or_else(|| CommerceError::NotFound(format!("Order not found: {id}")))
    }
}
