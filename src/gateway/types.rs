//! Gateway entity types.
//!
//! These are the crate's own views of the Stripe objects it works with. The
//! live gateway maps `async-stripe` types into them; the in-memory gateway
//! stores them directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key under which a customer's category is stored.
pub const META_CATEGORY: &str = "category";

/// Largest page size the gateway accepts.
pub const MAX_PAGE_SIZE: u8 = 100;

/// Anything that can be addressed by an opaque gateway id.
///
/// Used by the pagination walker to derive the next cursor from the last item
/// of a page.
pub trait Identified {
    fn id(&self) -> &str;
}

/// A Stripe customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// True when the customer's latest automatically charged invoice failed.
    #[serde(default)]
    pub delinquent: bool,
    /// Id of the default payment source, if one is on file.
    pub default_source: Option<String>,
    /// Id of the coupon applied to the customer, if any.
    pub coupon: Option<String>,
}

impl Customer {
    /// The free-form category tag stored in metadata.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.metadata.get(META_CATEGORY).map(String::as_str)
    }

    #[must_use]
    pub fn has_default_source(&self) -> bool {
        self.default_source.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl Identified for Customer {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Reduced projection of a [`Customer`] used for bulk listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub id: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub delinquent: bool,
}

impl From<Customer> for CustomerSummary {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id,
            email: c.email,
            description: c.description,
            delinquent: c.delinquent,
        }
    }
}

/// Request to create a customer.
#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub email: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

/// Partial update of a customer. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub email: Option<String>,
    /// Metadata entries to set; existing keys not listed here are kept.
    pub metadata: Option<HashMap<String, String>>,
    /// Card token that replaces the customer's default source.
    pub source: Option<String>,
    pub coupon: Option<String>,
}

/// A billing plan defined on the Stripe dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    /// Amount charged per period in the smallest currency unit.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// A discount definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub valid: bool,
}

impl Coupon {
    /// Apply this coupon's discount to an amount in minor units.
    #[must_use]
    pub fn discount(&self, amount: i64) -> i64 {
        if let Some(pct) = self.percent_off {
            let off = (amount as f64 * pct / 100.0).round() as i64;
            (amount - off).max(0)
        } else if let Some(off) = self.amount_off {
            (amount - off).max(0)
        } else {
            amount
        }
    }
}

impl Identified for Coupon {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Subscription status as reported by Stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Trialing,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::PastDue => "past_due",
            Self::Trialing => "trialing",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription tying one customer to one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    /// Plan of the subscription's first item.
    pub plan_id: Option<String>,
    pub status: SubscriptionStatus,
    /// Creation time (Unix timestamp).
    pub created: i64,
}

impl Identified for Subscription {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Request to create a subscription billed by automatic charging.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: String,
    pub plan_id: String,
}

/// An invoice generated by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Amount due in the smallest currency unit.
    pub amount_due: i64,
    /// Amount already paid.
    pub amount_paid: i64,
    pub currency: Option<String>,
    /// Creation time (Unix timestamp).
    pub created: i64,
    /// The charge that paid this invoice, if any.
    pub charge_id: Option<String>,
    #[serde(default)]
    pub paid: bool,
}

impl Identified for Invoice {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Succeeded,
    Pending,
    Failed,
}

impl ChargeStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment attempt against a customer's source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: ChargeStatus,
    #[serde(default)]
    pub paid: bool,
    pub customer_id: Option<String>,
}

/// A card attached to a customer as a payment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub customer_id: Option<String>,
    pub brand: Option<String>,
    pub last4: Option<String>,
}

impl Identified for Card {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Cursor parameters for a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Page size, 1 to [`MAX_PAGE_SIZE`].
    pub limit: u8,
    /// Return items after the one with this id.
    pub starting_after: Option<String>,
}

impl ListParams {
    /// Parameters for the first page.
    #[must_use]
    pub fn first(limit: u8) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            starting_after: None,
        }
    }

    /// Parameters for the page following `cursor`.
    #[must_use]
    pub fn after(&self, cursor: impl Into<String>) -> Self {
        Self {
            limit: self.limit,
            starting_after: Some(cursor.into()),
        }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self::first(MAX_PAGE_SIZE)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Whether the gateway has more items after this page.
    pub has_more: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(data: Vec<T>, has_more: bool) -> Self {
        Self { data, has_more }
    }
}

/// Filter for customer listings.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    /// Exact, case-sensitive email match.
    pub email: Option<String>,
    pub page: ListParams,
}

/// Filter for subscription listings. Cancelled subscriptions are excluded.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionQuery {
    pub customer_id: Option<String>,
    pub plan_id: Option<String>,
    pub page: ListParams,
}

/// Filter for invoice listings.
#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub subscription_id: Option<String>,
    pub page: ListParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(percent_off: Option<f64>, amount_off: Option<i64>) -> Coupon {
        Coupon {
            id: "C".to_string(),
            percent_off,
            amount_off,
            currency: None,
            valid: true,
        }
    }

    #[test]
    fn test_percent_discount() {
        assert_eq!(coupon(Some(10.0), None).discount(100), 90);
        assert_eq!(coupon(Some(25.0), None).discount(999), 749);
        assert_eq!(coupon(Some(100.0), None).discount(500), 0);
    }

    #[test]
    fn test_amount_discount_never_negative() {
        assert_eq!(coupon(None, Some(30)).discount(100), 70);
        assert_eq!(coupon(None, Some(300)).discount(100), 0);
        assert_eq!(coupon(None, None).discount(100), 100);
    }

    #[test]
    fn test_status_display_matches_wire_form() {
        assert_eq!(ChargeStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(ChargeStatus::Failed.to_string(), "failed");
        assert_eq!(SubscriptionStatus::PastDue.to_string(), "past_due");
        assert_eq!(
            serde_json::to_string(&ChargeStatus::Pending).unwrap(),
            format!("\"{}\"", ChargeStatus::Pending)
        );
    }

    #[test]
    fn test_list_params_clamped() {
        assert_eq!(ListParams::first(0).limit, 1);
        assert_eq!(ListParams::first(250).limit, 100);

        let next = ListParams::first(10).after("cus_9");
        assert_eq!(next.limit, 10);
        assert_eq!(next.starting_after.as_deref(), Some("cus_9"));
    }

    #[test]
    fn test_customer_category_and_source() {
        let mut c = Customer {
            id: "cus_1".to_string(),
            email: Some("a@example.com".to_string()),
            description: None,
            metadata: HashMap::new(),
            delinquent: false,
            default_source: Some(String::new()),
            coupon: None,
        };
        assert_eq!(c.category(), None);
        assert!(!c.has_default_source());

        c.metadata.insert(META_CATEGORY.to_string(), "CAT1".to_string());
        c.default_source = Some("card_1".to_string());
        assert_eq!(c.category(), Some("CAT1"));
        assert!(c.has_default_source());

        let summary = CustomerSummary::from(c);
        assert_eq!(summary.id, "cus_1");
        assert_eq!(summary.email.as_deref(), Some("a@example.com"));
    }
}
