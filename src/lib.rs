//! stripe-service - a convenience client over the Stripe API
//!
//! Wraps customer, subscription, coupon, invoice and payment-source calls in
//! single method calls, walking paginated listings to completion and enforcing
//! a few client-side rules:
//!
//! - customer emails are unique among active customers
//! - a customer has at most one active subscription
//! - a payment source must be on file before subscribing
//!
//! Every failure comes back as a [`StripeServiceError`]; remote failures keep
//! their cause and HTTP status in a [`GatewayError`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stripe_service::{ConfigBuilder, StripeService};
//!
//! #[tokio::main]
//! async fn main() -> stripe_service::Result<()> {
//!     stripe_service::init_tracing();
//!
//!     let config = ConfigBuilder::new()
//!         .from_env()
//!         .build()?;
//!     let service = StripeService::live(&config)?;
//!
//!     for customer in service.list_all_customers().await? {
//!         println!("{} {:?}", customer.id, customer.email);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! With the `test-gateway` feature, [`InMemoryGateway`] emulates the Stripe
//! objects this crate touches so services can be exercised without network
//! access.

mod config;
mod error;
pub mod gateway;
pub mod pagination;
mod service;
pub mod utils;

pub use config::{ConfigBuilder, LoggingConfig, StripeServiceConfig};
pub use error::{ErrorKind, GatewayError, Result, StripeServiceError};
#[cfg(any(test, feature = "test-gateway"))]
pub use gateway::InMemoryGateway;
pub use gateway::{
    Card, Charge, ChargeStatus, Coupon, Customer, CustomerSummary, Gateway, Invoice, LiveGateway,
    LiveGatewayConfig, Plan, Subscription, SubscriptionStatus,
};
pub use pagination::{Paginator, StopRule};
pub use service::StripeService;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "stripe_service=debug")
/// - `STRIPE_SERVICE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("STRIPE_SERVICE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    install(env_filter, json_logs);
}

/// Initialize tracing from a [`LoggingConfig`]
pub fn init_tracing_with_config(config: &LoggingConfig) {
    install(EnvFilter::new(&config.level), config.json);
}

fn install(env_filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
