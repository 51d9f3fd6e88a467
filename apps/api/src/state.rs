use std::sync::Arc;

use crate::accounts::AccountRepository;
use crate::config::Config;
use crate::payment::paystack::PaystackClient;
use crate::payment::PaymentGateway;
use crate::session::SessionStorage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Authoritative user records. In-memory or Postgres.
    pub accounts: Arc<dyn AccountRepository>,
    /// Durable per-client session records.
    pub sessions: Arc<dyn SessionStorage>,
    /// Gateway used by the registration workflow.
    pub gateway: Arc<dyn PaymentGateway>,
    /// Raw client behind the proxy endpoint.
    pub paystack: PaystackClient,
}

#[cfg(test)]
impl AppState {
    /// In-memory backends with Paystack at `paystack_base`.
    pub fn for_tests(paystack_base: &str) -> Self {
        let paystack = PaystackClient::new(paystack_base, "sk_test_secret".to_string())
            .expect("test Paystack base URL");
        Self::with_gateway(paystack_base, Arc::new(paystack))
    }

    /// In-memory backends with a scripted gateway for the workflow.
    pub fn with_gateway(paystack_base: &str, gateway: Arc<dyn PaymentGateway>) -> Self {
        use std::time::Duration;

        use crate::accounts::InMemoryAccountRepository;
        use crate::session::MemorySessionStorage;

        let paystack = PaystackClient::new(paystack_base, "sk_test_secret".to_string())
            .expect("test Paystack base URL");
        AppState {
            config: Config {
                paystack_secret_key: "sk_test_secret".to_string(),
                paystack_api_base: paystack_base.to_string(),
                public_base_url: "http://localhost:8080".to_string(),
                port: 8080,
                rust_log: "debug".to_string(),
                database_url: None,
                redis_url: None,
                session_dir: None,
                mock_latency: Duration::ZERO,
            },
            accounts: Arc::new(InMemoryAccountRepository::new()),
            sessions: Arc::new(MemorySessionStorage::new()),
            gateway,
            paystack,
        }
    }
}
