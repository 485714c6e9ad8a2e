//! Live gateway backed by the Stripe HTTP API.
//!
//! Holds the API key as a [`SecretString`], validates its format up front,
//! applies a per-request timeout and attaches idempotency keys to mutating
//! calls. It never retries; a timed out request surfaces as an HTTP 408
//! [`GatewayError`].

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result, StripeServiceError};

use super::types::*;
use super::{CatalogGateway, CustomerGateway, InvoiceGateway, PaymentSourceGateway, SubscriptionGateway};

const LOG_TARGET: &str = "stripe_service::gateway";

/// Configuration for the live gateway.
#[derive(Debug, Clone)]
pub struct LiveGatewayConfig {
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LiveGatewayConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

impl LiveGatewayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set request timeout.
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Validate a Stripe secret or restricted API key.
///
/// Accepted prefixes are `sk_test_`, `sk_live_`, `rk_test_` and `rk_live_`.
/// Publishable keys are rejected.
pub(crate) fn validate_api_key(key: &str) -> Result<()> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(StripeServiceError::configuration("API key cannot be empty"));
    }

    if key.len() < MIN_KEY_LENGTH {
        return Err(StripeServiceError::configuration(format!(
            "API key too short (minimum {} characters)",
            MIN_KEY_LENGTH
        )));
    }

    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(StripeServiceError::configuration(
            "API key must start with sk_test_, sk_live_, rk_test_, or rk_live_",
        ));
    }

    Ok(())
}

fn parse_id<T: FromStr>(kind: &str, id: &str) -> Result<T> {
    id.parse()
        .map_err(|_| StripeServiceError::invalid_argument(format!("Invalid {} ID: {}", kind, id)))
}

/// Gateway talking to api.stripe.com.
#[derive(Clone)]
pub struct LiveGateway {
    client: stripe::Client,
    config: LiveGatewayConfig,
    api_key: SecretString,
}

impl LiveGateway {
    /// Create a live gateway.
    ///
    /// # Errors
    ///
    /// Returns [`StripeServiceError::Configuration`] if the key format is invalid.
    pub fn new(api_key: impl Into<SecretString>, config: LiveGatewayConfig) -> Result<Self> {
        let api_key: SecretString = api_key.into();
        validate_api_key(api_key.expose_secret())?;

        let client = stripe::Client::new(api_key.expose_secret()).with_app_info(
            env!("CARGO_PKG_NAME").to_string(),
            Some(env!("CARGO_PKG_VERSION").to_string()),
            None,
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Create a gateway with default configuration.
    pub fn with_default_config(api_key: impl Into<SecretString>) -> Result<Self> {
        Self::new(api_key, LiveGatewayConfig::default())
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    #[must_use]
    pub fn is_live_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_live_") || key.starts_with("rk_live_")
    }

    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    #[inline]
    fn generate_idempotency_key(operation: &str) -> String {
        format!("{}_{}", operation, uuid::Uuid::new_v4())
    }

    /// A client that sends an idempotency key, for mutating calls.
    #[inline]
    fn idempotent_client(&self, operation: &str) -> stripe::Client {
        let key = Self::generate_idempotency_key(operation);
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key))
    }

    async fn call<T>(&self, operation: &str, request: stripe::Response<T>) -> Result<T> {
        tracing::debug!(target: LOG_TARGET, operation = operation, "Calling Stripe");
        with_timeout(self.timeout(), operation, request).await
    }
}

impl std::fmt::Debug for LiveGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveGateway")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

/// Await a Stripe request, giving up after `timeout`.
async fn with_timeout<T, Fut>(timeout: Duration, operation: &str, request: Fut) -> Result<T>
where
    Fut: std::future::Future<Output = std::result::Result<T, stripe::StripeError>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let err = map_stripe_error(e, operation);
            tracing::warn!(
                target: LOG_TARGET,
                operation = operation,
                http_status = err.http_status,
                error = %err.message,
                "Stripe API call failed"
            );
            Err(err.into())
        }
        Err(_elapsed) => {
            tracing::warn!(
                target: LOG_TARGET,
                operation = operation,
                timeout_seconds = timeout.as_secs(),
                "Stripe API request timed out"
            );
            Err(GatewayError::new(
                operation,
                format!("Request timed out after {} seconds", timeout.as_secs()),
            )
            .with_status(408)
            .into())
        }
    }
}

fn map_stripe_error(error: stripe::StripeError, operation: &str) -> GatewayError {
    let mapped = match &error {
        stripe::StripeError::Stripe(request_error) => {
            let message = request_error
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            let mut mapped = GatewayError::new(operation, message).with_status(request_error.http_status);
            if let Some(ref code) = request_error.code {
                mapped = mapped.with_code(snake_case(&format!("{code:?}")));
            }
            mapped
        }
        stripe::StripeError::Timeout => {
            GatewayError::new(operation, "Request timed out").with_status(408)
        }
        stripe::StripeError::ClientError(msg) => {
            GatewayError::new(operation, format!("HTTP client error: {msg}"))
        }
        other => GatewayError::new(operation, other.to_string()),
    };
    mapped.with_source(error)
}

/// `ResourceMissing` -> `resource_missing`, matching Stripe's wire codes.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Treat "no such object" as an absent result.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StripeServiceError::Gateway(ref err)) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

fn limit(page: &ListParams) -> u64 {
    u64::from(page.limit.clamp(1, MAX_PAGE_SIZE))
}

fn cursor<T: FromStr>(kind: &str, page: &ListParams) -> Result<Option<T>> {
    page.starting_after
        .as_deref()
        .map(|id| parse_id(kind, id))
        .transpose()
}

// ============================================================================
// Mapping from async-stripe types
// ============================================================================

fn map_customer(c: stripe::Customer) -> Customer {
    Customer {
        id: c.id.to_string(),
        email: c.email,
        description: c.description,
        metadata: c.metadata.unwrap_or_default(),
        delinquent: c.delinquent.unwrap_or(false),
        default_source: c.default_source.map(|s| s.id().to_string()),
        coupon: c.discount.map(|d| d.coupon.id.to_string()),
    }
}

fn map_subscription_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    match status {
        stripe::SubscriptionStatus::Active => SubscriptionStatus::Active,
        stripe::SubscriptionStatus::Canceled => SubscriptionStatus::Canceled,
        stripe::SubscriptionStatus::Incomplete => SubscriptionStatus::Incomplete,
        stripe::SubscriptionStatus::IncompleteExpired => SubscriptionStatus::IncompleteExpired,
        stripe::SubscriptionStatus::PastDue => SubscriptionStatus::PastDue,
        stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Trialing,
        stripe::SubscriptionStatus::Unpaid => SubscriptionStatus::Unpaid,
        stripe::SubscriptionStatus::Paused => SubscriptionStatus::Paused,
    }
}

fn map_subscription(sub: stripe::Subscription) -> Subscription {
    let plan_id = sub
        .items
        .data
        .first()
        .and_then(|item| item.plan.as_ref())
        .map(|plan| plan.id.to_string());

    Subscription {
        id: sub.id.to_string(),
        customer_id: sub.customer.id().to_string(),
        plan_id,
        status: map_subscription_status(sub.status),
        created: sub.created,
    }
}

fn map_plan(p: stripe::Plan) -> Plan {
    Plan {
        id: p.id.to_string(),
        amount: p.amount,
        currency: p.currency.map(|c| c.to_string()),
        active: p.active.unwrap_or(false),
    }
}

fn map_coupon(c: stripe::Coupon) -> Coupon {
    Coupon {
        id: c.id.to_string(),
        percent_off: c.percent_off,
        amount_off: c.amount_off,
        currency: c.currency.map(|cur| cur.to_string()),
        valid: c.valid.unwrap_or(false),
    }
}

fn map_invoice(i: stripe::Invoice) -> Invoice {
    Invoice {
        id: i.id.to_string(),
        customer_id: i.customer.map(|c| c.id().to_string()),
        subscription_id: i.subscription.map(|s| s.id().to_string()),
        amount_due: i.amount_due.unwrap_or(0),
        amount_paid: i.amount_paid.unwrap_or(0),
        currency: i.currency.map(|c| c.to_string()),
        created: i.created.unwrap_or(0),
        charge_id: i.charge.map(|c| c.id().to_string()),
        paid: i.paid.unwrap_or(false),
    }
}

fn map_charge(c: stripe::Charge) -> Charge {
    let status = match c.status {
        stripe::ChargeStatus::Succeeded => ChargeStatus::Succeeded,
        stripe::ChargeStatus::Pending => ChargeStatus::Pending,
        stripe::ChargeStatus::Failed => ChargeStatus::Failed,
    };

    Charge {
        id: c.id.to_string(),
        amount: c.amount,
        currency: c.currency.to_string(),
        status,
        paid: c.paid,
        customer_id: c.customer.map(|cus| cus.id().to_string()),
    }
}

// ============================================================================
// Card sources
//
// Listing and deleting sources goes through the raw client, with our own wire
// types covering only the fields we read.
// ============================================================================

#[derive(Debug, Serialize)]
struct SourceListParams<'a> {
    object: &'a str,
    limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    starting_after: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SourceList {
    data: Vec<SourceCard>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SourceCard {
    id: String,
    customer: Option<String>,
    brand: Option<String>,
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeletedSource {
    #[allow(dead_code)]
    id: String,
    #[serde(default)]
    deleted: bool,
}

// ============================================================================
// Gateway trait implementations
// ============================================================================

impl CustomerGateway for LiveGateway {
    async fn create_customer(&self, request: NewCustomer) -> Result<Customer> {
        let client = self.idempotent_client("create_customer");

        let mut params = stripe::CreateCustomer::new();
        params.email = Some(&request.email);
        params.description = Some(&request.description);
        if !request.metadata.is_empty() {
            params.metadata = Some(request.metadata.clone());
        }

        let customer = self
            .call("create_customer", stripe::Customer::create(&client, params))
            .await?;

        Ok(map_customer(customer))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        let Ok(id) = customer_id.parse::<stripe::CustomerId>() else {
            return Ok(None);
        };

        let customer = optional(
            self.call(
                "retrieve_customer",
                stripe::Customer::retrieve(&self.client, &id, &[]),
            )
            .await,
        )?;

        Ok(customer.filter(|c| !c.deleted).map(map_customer))
    }

    async fn list_customers(&self, query: CustomerQuery) -> Result<Page<Customer>> {
        let mut params = stripe::ListCustomers::new();
        params.email = query.email.as_deref();
        params.limit = Some(limit(&query.page));
        params.starting_after = cursor("customer", &query.page)?;

        let list = self
            .call("list_customers", stripe::Customer::list(&self.client, &params))
            .await?;

        Ok(Page::new(
            list.data.into_iter().map(map_customer).collect(),
            list.has_more,
        ))
    }

    async fn update_customer(&self, customer_id: &str, update: CustomerUpdate) -> Result<Customer> {
        let client = self.idempotent_client("update_customer");
        let id: stripe::CustomerId = parse_id("customer", customer_id)?;

        let mut params = stripe::UpdateCustomer::new();
        params.email = update.email.as_deref();
        params.metadata = update.metadata.clone();
        if let Some(ref token) = update.source {
            params.source = Some(stripe::PaymentSourceParams::Token(parse_id("token", token)?));
        }
        if let Some(ref coupon) = update.coupon {
            params.coupon = Some(parse_id("coupon", coupon)?);
        }

        let customer = self
            .call(
                "update_customer",
                stripe::Customer::update(&client, &id, params),
            )
            .await?;

        Ok(map_customer(customer))
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<()> {
        let id: stripe::CustomerId = parse_id("customer", customer_id)?;

        self.call(
            "delete_customer",
            stripe::Customer::delete(&self.client, &id),
        )
        .await?;

        Ok(())
    }
}

impl SubscriptionGateway for LiveGateway {
    async fn create_subscription(&self, request: NewSubscription) -> Result<Subscription> {
        let client = self.idempotent_client("create_subscription");
        let customer_id: stripe::CustomerId = parse_id("customer", &request.customer_id)?;

        let mut params = stripe::CreateSubscription::new(customer_id);
        params.items = Some(vec![stripe::CreateSubscriptionItems {
            plan: Some(request.plan_id.clone()),
            ..Default::default()
        }]);
        params.collection_method = Some(stripe::CollectionMethod::ChargeAutomatically);

        let subscription = self
            .call(
                "create_subscription",
                stripe::Subscription::create(&client, params),
            )
            .await?;

        Ok(map_subscription(subscription))
    }

    async fn list_subscriptions(&self, query: SubscriptionQuery) -> Result<Page<Subscription>> {
        let mut params = stripe::ListSubscriptions::new();
        params.customer = query
            .customer_id
            .as_deref()
            .map(|id| parse_id("customer", id))
            .transpose()?;
        params.plan = query
            .plan_id
            .as_deref()
            .map(|id| parse_id("plan", id))
            .transpose()?;
        params.limit = Some(limit(&query.page));
        params.starting_after = cursor("subscription", &query.page)?;

        let list = self
            .call(
                "list_subscriptions",
                stripe::Subscription::list(&self.client, &params),
            )
            .await?;

        Ok(Page::new(
            list.data.into_iter().map(map_subscription).collect(),
            list.has_more,
        ))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        let id: stripe::SubscriptionId = parse_id("subscription", subscription_id)?;

        self.call(
            "cancel_subscription",
            stripe::Subscription::cancel(&self.client, &id, stripe::CancelSubscription::default()),
        )
        .await?;

        Ok(())
    }
}

impl CatalogGateway for LiveGateway {
    async fn retrieve_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        let id: stripe::PlanId = parse_id("plan", plan_id)?;

        let plan = optional(
            self.call("retrieve_plan", stripe::Plan::retrieve(&self.client, &id, &[]))
                .await,
        )?;

        Ok(plan.map(map_plan))
    }

    async fn retrieve_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>> {
        let id: stripe::CouponId = parse_id("coupon", coupon_id)?;

        let coupon = optional(
            self.call(
                "retrieve_coupon",
                stripe::Coupon::retrieve(&self.client, &id, &[]),
            )
            .await,
        )?;

        Ok(coupon.map(map_coupon))
    }

    async fn list_coupons(&self, page: ListParams) -> Result<Page<Coupon>> {
        let mut params = stripe::ListCoupons::new();
        params.limit = Some(limit(&page));
        params.starting_after = cursor("coupon", &page)?;

        let list = self
            .call("list_coupons", stripe::Coupon::list(&self.client, &params))
            .await?;

        Ok(Page::new(
            list.data.into_iter().map(map_coupon).collect(),
            list.has_more,
        ))
    }
}

impl InvoiceGateway for LiveGateway {
    async fn list_invoices(&self, query: InvoiceQuery) -> Result<Page<Invoice>> {
        let mut params = stripe::ListInvoices::new();
        params.subscription = query
            .subscription_id
            .as_deref()
            .map(|id| parse_id("subscription", id))
            .transpose()?;
        params.limit = Some(limit(&query.page));
        params.starting_after = cursor("invoice", &query.page)?;

        let list = self
            .call("list_invoices", stripe::Invoice::list(&self.client, &params))
            .await?;

        Ok(Page::new(
            list.data.into_iter().map(map_invoice).collect(),
            list.has_more,
        ))
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Option<Charge>> {
        let Ok(id) = charge_id.parse::<stripe::ChargeId>() else {
            return Ok(None);
        };

        let charge = optional(
            self.call(
                "retrieve_charge",
                stripe::Charge::retrieve(&self.client, &id, &[]),
            )
            .await,
        )?;

        Ok(charge.map(map_charge))
    }
}

impl PaymentSourceGateway for LiveGateway {
    async fn list_cards(&self, customer_id: &str, page: ListParams) -> Result<Page<Card>> {
        let params = SourceListParams {
            object: "card",
            limit: limit(&page),
            starting_after: page.starting_after.as_deref(),
        };
        let path = format!("/customers/{}/sources", customer_id);

        let list: SourceList = self
            .call("list_cards", self.client.get_query(&path, &params))
            .await?;

        let cards = list
            .data
            .into_iter()
            .map(|c| Card {
                id: c.id,
                customer_id: c.customer,
                brand: c.brand,
                last4: c.last4,
            })
            .collect();

        Ok(Page::new(cards, list.has_more))
    }

    async fn delete_card(&self, customer_id: &str, card_id: &str) -> Result<()> {
        let path = format!("/customers/{}/sources/{}", customer_id, card_id);

        let deleted: DeletedSource = self
            .call("delete_card", self.client.delete(&path))
            .await?;

        if !deleted.deleted {
            return Err(GatewayError::new("delete_card", format!("Source {} was not deleted", card_id)).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_api_key_valid() {
        assert!(validate_api_key("sk_test_1234567890abcdef").is_ok());
        assert!(validate_api_key("sk_live_1234567890abcdef").is_ok());
        assert!(validate_api_key("rk_test_1234567890abcdef").is_ok());
        assert!(validate_api_key("rk_live_1234567890abcdef").is_ok());
    }

    #[test]
    fn test_validate_api_key_invalid() {
        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("invalid_key").is_err());
        assert!(validate_api_key("sk_test_short").is_err());
        // publishable key
        assert_eq!(
            validate_api_key("pk_test_1234567890abcdef").unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_test_and_live_mode() {
        let gateway = LiveGateway::with_default_config("sk_test_12345678901234567890").unwrap();
        assert!(gateway.is_test_mode());
        assert!(!gateway.is_live_mode());

        let gateway = LiveGateway::with_default_config("rk_live_12345678901234567890").unwrap();
        assert!(!gateway.is_test_mode());
        assert!(gateway.is_live_mode());
    }

    #[test]
    fn test_debug_does_not_expose_api_key() {
        let gateway = LiveGateway::with_default_config("sk_test_secret_key_1234567890").unwrap();
        let debug_output = format!("{:?}", gateway);

        assert!(!debug_output.contains("sk_test_secret_key_1234567890"));
        assert!(debug_output.contains("is_test_mode: true"));
    }

    #[test]
    fn test_idempotency_keys_are_unique() {
        let key1 = LiveGateway::generate_idempotency_key("create_customer");
        let key2 = LiveGateway::generate_idempotency_key("create_customer");

        assert!(key1.starts_with("create_customer_"));
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_timeout_from_config() {
        let config = LiveGatewayConfig::new().timeout_seconds(45);
        let gateway = LiveGateway::new("sk_test_12345678901234567890", config).unwrap();
        assert_eq!(gateway.timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_stripe_timeout_maps_to_408() {
        let err = map_stripe_error(stripe::StripeError::Timeout, "list_customers");
        assert_eq!(err.http_status, Some(408));
        assert_eq!(err.operation, "list_customers");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_snake_case_codes() {
        assert_eq!(snake_case("ResourceMissing"), "resource_missing");
        assert_eq!(snake_case("CardDeclined"), "card_declined");
        assert_eq!(snake_case("x"), "x");
    }

    #[tokio::test]
    async fn test_request_timeout_is_reported() {
        let pending = std::future::pending::<std::result::Result<(), stripe::StripeError>>();
        let err = with_timeout(Duration::from_millis(10), "retrieve_plan", pending)
            .await
            .unwrap_err();

        let gateway = err.gateway_error().unwrap();
        assert_eq!(gateway.http_status, Some(408));
        assert!(gateway.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_malformed_customer_id_is_absent() {
        let gateway = LiveGateway::with_default_config("sk_test_12345678901234567890").unwrap();
        assert!(gateway.retrieve_customer("not-a-customer").await.unwrap().is_none());
    }
}
