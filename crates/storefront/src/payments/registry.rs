//! Gateway id to adapter mapping.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::{
    CardAdapter, OfflineAdapter, PaymentAdapter, PaymentIntents, WalletAdapter, WalletOrders,
};

/// Backend gateway ids served by the card adapter.
pub const CARD_GATEWAYS: &[&str] = &["stripe"];
/// Backend gateway ids served by the wallet adapter.
pub const WALLET_GATEWAYS: &[&str] = &["ppcp-gateway", "paypal"];
/// Backend gateway ids with no online capture.
pub const OFFLINE_GATEWAYS: &[&str] = &["cod", "bacs", "cheque"];

/// Adapters keyed by backend gateway id.
#[derive(Clone, Default)]
pub struct PaymentRegistry {
    adapters: HashMap<String, Arc<dyn PaymentAdapter>>,
}

impl PaymentRegistry {
    /// Registry with the offline gateways plus card and wallet gateways for
    /// whichever providers are available.
    #[must_use]
    pub fn new(
        intents: Option<Arc<dyn PaymentIntents>>,
        wallet: Option<Arc<dyn WalletOrders>>,
    ) -> Self {
        let mut registry = Self::default();
        for id in OFFLINE_GATEWAYS {
            registry.register(Arc::new(OfflineAdapter::new(*id)));
        }
        if let Some(intents) = intents {
            for id in CARD_GATEWAYS {
                registry.register(Arc::new(CardAdapter::new(*id, Arc::clone(&intents))));
            }
        }
        if let Some(wallet) = wallet {
            for id in WALLET_GATEWAYS {
                registry.register(Arc::new(WalletAdapter::new(*id, Arc::clone(&wallet))));
            }
        }
        info!(gateways = ?registry.gateway_ids(), "Payment adapters registered");
        registry
    }

    /// Register (or replace) an adapter under its gateway id.
    pub fn register(&mut self, adapter: Arc<dyn PaymentAdapter>) {
        self.adapters
            .insert(adapter.gateway_id().to_string(), adapter);
    }

    #[must_use]
    pub fn get(&self, gateway_id: &str) -> Option<Arc<dyn PaymentAdapter>> {
        self.adapters.get(gateway_id).cloned()
    }

    #[must_use]
    pub fn supports(&self, gateway_id: &str) -> bool {
        self.adapters.contains_key(gateway_id)
    }

    fn gateway_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
