//! The remote gateway seam.
//!
//! Each entity family gets its own trait so that code needing only a slice of
//! the API can say so; [`Gateway`] combines them all and is what
//! [`StripeService`](crate::StripeService) is generic over.
//!
//! Reads that can legitimately miss (`retrieve_*`) return `Ok(None)` when the
//! gateway reports the object does not exist. Every other failure is an
//! `Err` carrying a [`GatewayError`](crate::GatewayError).

pub mod live;
#[cfg(any(test, feature = "test-gateway"))]
pub mod memory;
pub mod types;

pub use live::{LiveGateway, LiveGatewayConfig};
#[cfg(any(test, feature = "test-gateway"))]
pub use memory::InMemoryGateway;
pub use types::*;

use crate::error::Result;

/// Customer operations.
#[allow(async_fn_in_trait)]
pub trait CustomerGateway: Send + Sync {
    /// Create a customer.
    async fn create_customer(&self, request: NewCustomer) -> Result<Customer>;

    /// Retrieve a customer. Deleted customers are reported as `None`.
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Option<Customer>>;

    /// List active customers, optionally filtered by exact email.
    async fn list_customers(&self, query: CustomerQuery) -> Result<Page<Customer>>;

    /// Apply a partial update to a customer.
    async fn update_customer(&self, customer_id: &str, update: CustomerUpdate) -> Result<Customer>;

    /// Delete a customer. The gateway keeps its history.
    async fn delete_customer(&self, customer_id: &str) -> Result<()>;
}

/// Subscription operations.
#[allow(async_fn_in_trait)]
pub trait SubscriptionGateway: Send + Sync {
    /// Create a subscription billed by charging automatically.
    async fn create_subscription(&self, request: NewSubscription) -> Result<Subscription>;

    /// List non-cancelled subscriptions.
    async fn list_subscriptions(&self, query: SubscriptionQuery) -> Result<Page<Subscription>>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()>;
}

/// Plans and coupons, which are configured on the dashboard rather than
/// through this crate.
#[allow(async_fn_in_trait)]
pub trait CatalogGateway: Send + Sync {
    async fn retrieve_plan(&self, plan_id: &str) -> Result<Option<Plan>>;

    async fn retrieve_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>>;

    async fn list_coupons(&self, page: ListParams) -> Result<Page<Coupon>>;
}

/// Invoices and the charges that paid them.
#[allow(async_fn_in_trait)]
pub trait InvoiceGateway: Send + Sync {
    async fn list_invoices(&self, query: InvoiceQuery) -> Result<Page<Invoice>>;

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Option<Charge>>;
}

/// Card sources attached to customers.
#[allow(async_fn_in_trait)]
pub trait PaymentSourceGateway: Send + Sync {
    /// List the card sources of a customer.
    async fn list_cards(&self, customer_id: &str, page: ListParams) -> Result<Page<Card>>;

    /// Detach and delete a card from a customer.
    async fn delete_card(&self, customer_id: &str, card_id: &str) -> Result<()>;
}

/// A type that implements every gateway trait.
pub trait Gateway:
    CustomerGateway + SubscriptionGateway + CatalogGateway + InvoiceGateway + PaymentSourceGateway
{
}

impl<T> Gateway for T where
    T: CustomerGateway
        + SubscriptionGateway
        + CatalogGateway
        + InvoiceGateway
        + PaymentSourceGateway
{
}
