//! Application state shared across handlers.

use std::sync::Arc;

use crate::checkout::CheckoutServices;
use crate::commerce::{CatalogClient, CommerceBackend};
use crate::config::StorefrontConfig;
use crate::confirmation::ConfirmationPoller;
use crate::payments::{PayPalClient, PaymentIntents, PaymentRegistry, StripeClient, WalletOrders};
use crate::services::{
    AddressLookupClient, AnalyticsSink, Ga4Client, KlaviyoClient, KlaviyoError, NoopAnalytics,
    ReviewForwarder,
};
use crate::session::ShopperSessions;

/// External systems the storefront talks to.
///
/// Built from configuration in production; tests substitute in-memory
/// implementations.
#[derive(Clone)]
pub struct Providers {
    pub backend: Arc<dyn CommerceBackend>,
    pub intents: Option<Arc<dyn PaymentIntents>>,
    pub wallet: Option<Arc<dyn WalletOrders>>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

impl Providers {
    /// Real clients for everything configured.
    #[must_use]
    pub fn from_config(config: &StorefrontConfig) -> Self {
        let backend: Arc<dyn CommerceBackend> = Arc::new(CatalogClient::new(&config.commerce));
        let intents = config
            .payments
            .stripe
            .as_ref()
            .map(|c| Arc::new(StripeClient::new(c)) as Arc<dyn PaymentIntents>);
        let wallet = config
            .payments
            .paypal
            .as_ref()
            .map(|c| Arc::new(PayPalClient::new(c)) as Arc<dyn WalletOrders>);
        let analytics: Arc<dyn AnalyticsSink> = match &config.analytics {
            Some(c) => Arc::new(Ga4Client::new(c, config.checkout.currency.code())),
            None => Arc::new(NoopAnalytics),
        };

        Self {
            backend,
            intents,
            wallet,
            analytics,
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    providers: Providers,
    payments: Arc<PaymentRegistry>,
    shoppers: ShopperSessions,
    confirmation: ConfirmationPoller,
    klaviyo: Option<KlaviyoClient>,
    address_lookup: Option<AddressLookupClient>,
    reviews: ReviewForwarder,
}

impl AppState {
    /// Create application state with clients built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Klaviyo client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, KlaviyoError> {
        let providers = Providers::from_config(&config);
        Self::with_providers(config, providers)
    }

    /// Create application state around the given providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the Klaviyo client cannot be built.
    pub fn with_providers(
        config: StorefrontConfig,
        providers: Providers,
    ) -> Result<Self, KlaviyoError> {
        let payments = Arc::new(PaymentRegistry::new(
            providers.intents.clone(),
            providers.wallet.clone(),
        ));
        let shoppers = ShopperSessions::new(
            CheckoutServices {
                backend: Arc::clone(&providers.backend),
                payments: Arc::clone(&payments),
                analytics: Arc::clone(&providers.analytics),
            },
            config.checkout,
            &config.base_url,
        );
        let confirmation = ConfirmationPoller::new(
            Arc::clone(&providers.backend),
            providers.intents.clone(),
            Arc::clone(&providers.analytics),
            config.checkout.currency,
        );
        let klaviyo = config.klaviyo.as_ref().map(KlaviyoClient::new).transpose()?;
        let address_lookup = config.address_lookup.as_ref().map(AddressLookupClient::new);
        let reviews = ReviewForwarder::new(config.commerce.review_url.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                providers,
                payments,
                shoppers,
                confirmation,
                klaviyo,
                address_lookup,
                reviews,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The commerce backend.
    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn CommerceBackend> {
        &self.inner.providers.backend
    }

    /// The card processor, when configured.
    #[must_use]
    pub fn intents(&self) -> Option<&Arc<dyn PaymentIntents>> {
        self.inner.providers.intents.as_ref()
    }

    /// The wallet provider, when configured.
    #[must_use]
    pub fn wallet(&self) -> Option<&Arc<dyn WalletOrders>> {
        self.inner.providers.wallet.as_ref()
    }

    #[must_use]
    pub fn payments(&self) -> &Arc<PaymentRegistry> {
        &self.inner.payments
    }

    #[must_use]
    pub fn shoppers(&self) -> &ShopperSessions {
        &self.inner.shoppers
    }

    #[must_use]
    pub fn confirmation(&self) -> &ConfirmationPoller {
        &self.inner.confirmation
    }

    #[must_use]
    pub fn klaviyo(&self) -> Option<&KlaviyoClient> {
        self.inner.klaviyo.as_ref()
    }

    #[must_use]
    pub fn address_lookup(&self) -> Option<&AddressLookupClient> {
        self.inner.address_lookup.as_ref()
    }

    #[must_use]
    pub fn reviews(&self) -> &ReviewForwarder {
        &self.inner.reviews
    }
}
