//! The Stripe convenience facade.
//!
//! [`StripeService`] turns each high-level operation into an ordered sequence
//! of gateway calls, enforcing the client-side rules along the way: one
//! active subscription per customer, unique customer emails, and a payment
//! source on file before subscribing.
//!
//! Operations are split by entity across the submodules; each adds its own
//! `impl` block.

mod catalog;
mod customer;
mod source;
mod subscription;

use crate::config::{ConfigBuilder, StripeServiceConfig};
use crate::error::{Result, StripeServiceError};
use crate::gateway::{Customer, Gateway, LiveGateway};
use crate::pagination::Paginator;

pub(crate) const LOG_TARGET: &str = "stripe_service::service";

/// Stripe convenience client, generic over the gateway it talks to.
///
/// # Example
///
/// ```rust,no_run
/// use stripe_service::StripeService;
///
/// # async fn run() -> stripe_service::Result<()> {
/// let service = StripeService::from_env()?;
///
/// let customer_id = service
///     .create_customer("jane@example.com", "Jane Doe")
///     .await?;
/// service
///     .replace_payment_source_for_customer(&customer_id, "tok_visa")
///     .await?;
/// service
///     .create_subscription_and_charge(&customer_id, "monthly")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StripeService<G: Gateway> {
    gateway: G,
    paginator: Paginator,
}

impl<G: Gateway> StripeService<G> {
    /// Create a service over `gateway` with the default pagination walker.
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            paginator: Paginator::default(),
        }
    }

    /// Replace the pagination walker used by listing operations.
    #[must_use]
    pub fn with_paginator(mut self, paginator: Paginator) -> Self {
        self.paginator = paginator;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn paginator(&self) -> Paginator {
        self.paginator
    }

    /// Retrieve a customer that must exist.
    async fn resolve_customer(&self, customer_id: &str) -> Result<Customer> {
        self.retrieve_customer_by_id(customer_id)
            .await?
            .ok_or_else(|| StripeServiceError::not_found(format!("Customer '{}'", customer_id)))
    }
}

impl StripeService<LiveGateway> {
    /// Build a service talking to Stripe.
    ///
    /// # Errors
    ///
    /// Returns [`StripeServiceError::Configuration`] if the API key is rejected.
    pub fn live(config: &StripeServiceConfig) -> Result<Self> {
        let gateway = LiveGateway::new(config.api_key.clone(), config.gateway_config())?;
        Ok(Self::new(gateway).with_paginator(config.paginator()))
    }

    /// Build a service from `STRIPE_SERVICE_*` / `STRIPE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = ConfigBuilder::new().from_env().build()?;
        Self::live(&config)
    }
}

/// Reduce a listing that may hold at most one item.
pub(crate) fn at_most_one<T>(entity: &'static str, key: String, mut items: Vec<T>) -> Result<Option<T>> {
    match items.len() {
        0 => Ok(None),
        1 => Ok(items.pop()),
        count => Err(StripeServiceError::ambiguous(entity, key, count)),
    }
}

/// Reject empty or whitespace-only arguments.
pub(crate) fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StripeServiceError::invalid_argument(format!("{} must not be empty", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::error::ErrorKind;
    use crate::gateway::InMemoryGateway;
    use crate::pagination::StopRule;

    #[test]
    fn test_at_most_one() {
        assert_eq!(at_most_one::<u8>("x", "k".into(), vec![]).unwrap(), None);
        assert_eq!(at_most_one("x", "k".into(), vec![7]).unwrap(), Some(7));

        let err = at_most_one("customer", "email a@b.c".into(), vec![1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            StripeServiceError::AmbiguousResult { entity: "customer", count: 3, .. }
        ));
    }

    #[test]
    fn test_require() {
        assert!(require("email", "a@b.c").is_ok());
        assert_eq!(require("email", "").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(require("email", "   ").unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_live_from_config() {
        let config = ConfigBuilder::new()
            .with_api_key("sk_test_12345678901234567890")
            .with_page_size(10)
            .with_stop_rule(StopRule::FullPage)
            .build()
            .unwrap();

        let service = StripeService::live(&config).unwrap();
        assert!(service.gateway().is_test_mode());
        assert_eq!(service.paginator(), Paginator::new(10, StopRule::FullPage));
    }

    #[test]
    fn test_with_paginator() {
        let service = StripeService::new(InMemoryGateway::new())
            .with_paginator(Paginator::new(3, StopRule::SingleItem));
        assert_eq!(service.paginator().page_size(), 3);
    }
}
