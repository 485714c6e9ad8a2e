//! In-memory gateway for tests.
//!
//! Emulates the parts of Stripe this crate relies on: cursor pagination with
//! `has_more`, soft-deleted customers, cancelled subscriptions dropping out of
//! listings, coupons discounting the invoice generated when a subscription is
//! created or renewed, and replacing a customer's default source.
//!
//! Every call is recorded so tests can assert which remote operations ran, and
//! failures can be injected per operation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{GatewayError, Result};

use super::types::*;
use super::{CatalogGateway, CustomerGateway, InvoiceGateway, PaymentSourceGateway, SubscriptionGateway};

const EPOCH: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct StoredCustomer {
    customer: Customer,
    deleted: bool,
}

#[derive(Debug, Clone, Copy)]
struct FailureRule {
    status: u16,
    remaining_successes: usize,
}

#[derive(Debug, Default)]
struct State {
    customers: Vec<StoredCustomer>,
    plans: HashMap<String, Plan>,
    coupons: Vec<Coupon>,
    subscriptions: Vec<Subscription>,
    invoices: Vec<Invoice>,
    charges: HashMap<String, Charge>,
    cards: HashMap<String, Vec<Card>>,
    counter: u64,
    clock: i64,
    calls: Vec<String>,
    failures: HashMap<String, FailureRule>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}_mem_{}", prefix, self.counter)
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        EPOCH + self.clock
    }

    fn active_customer_mut(&mut self, customer_id: &str) -> Option<&mut Customer> {
        self.customers
            .iter_mut()
            .find(|c| !c.deleted && c.customer.id == customer_id)
            .map(|c| &mut c.customer)
    }

    fn active_customer(&self, customer_id: &str) -> Option<&Customer> {
        self.customers
            .iter()
            .find(|c| !c.deleted && c.customer.id == customer_id)
            .map(|c| &c.customer)
    }

    /// Charge the customer's source for one period of `plan` and record the
    /// paid invoice, discounted by the customer's coupon.
    fn bill(&mut self, customer: &Customer, plan: &Plan, subscription_id: &str, created: i64) -> Invoice {
        let base = plan.amount.unwrap_or(0);
        let amount = match customer.coupon {
            Some(ref coupon_id) => self
                .coupons
                .iter()
                .find(|c| &c.id == coupon_id)
                .map(|c| c.discount(base))
                .unwrap_or(base),
            None => base,
        };
        let currency = plan.currency.clone().unwrap_or_else(|| "usd".to_string());

        let charge = Charge {
            id: self.next_id("ch"),
            amount,
            currency: currency.clone(),
            status: ChargeStatus::Succeeded,
            paid: true,
            customer_id: Some(customer.id.clone()),
        };
        let invoice = Invoice {
            id: self.next_id("in"),
            customer_id: Some(customer.id.clone()),
            subscription_id: Some(subscription_id.to_string()),
            amount_due: amount,
            amount_paid: amount,
            currency: Some(currency),
            created,
            charge_id: Some(charge.id.clone()),
            paid: true,
        };

        self.charges.insert(charge.id.clone(), charge);
        self.invoices.push(invoice.clone());
        invoice
    }
}

/// In-memory implementation of every gateway trait.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plan, as if created on the dashboard.
    #[must_use]
    pub fn with_plan(self, plan_id: impl Into<String>, amount: i64) -> Self {
        let plan_id = plan_id.into();
        self.state.lock().unwrap().plans.insert(
            plan_id.clone(),
            Plan {
                id: plan_id,
                amount: Some(amount),
                currency: Some("usd".to_string()),
                active: true,
            },
        );
        self
    }

    /// Register a percentage-off coupon.
    #[must_use]
    pub fn with_percent_off_coupon(self, coupon_id: impl Into<String>, percent_off: f64) -> Self {
        self.with_coupon(Coupon {
            id: coupon_id.into(),
            percent_off: Some(percent_off),
            amount_off: None,
            currency: None,
            valid: true,
        })
    }

    /// Register an arbitrary coupon.
    #[must_use]
    pub fn with_coupon(self, coupon: Coupon) -> Self {
        self.state.lock().unwrap().coupons.push(coupon);
        self
    }

    /// Make every call to `operation` fail with the given HTTP status.
    pub fn fail_operation(&self, operation: &str, status: u16) {
        self.fail_operation_after(operation, 0, status);
    }

    /// Let `successes` calls to `operation` through, then fail the rest.
    pub fn fail_operation_after(&self, operation: &str, successes: usize, status: u16) {
        self.state.lock().unwrap().failures.insert(
            operation.to_string(),
            FailureRule {
                status,
                remaining_successes: successes,
            },
        );
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Set the delinquency flag the gateway reports for a customer.
    pub fn set_delinquent(&self, customer_id: &str, delinquent: bool) {
        if let Some(c) = self.state.lock().unwrap().active_customer_mut(customer_id) {
            c.delinquent = delinquent;
        }
    }

    /// Names of every gateway operation invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of times `operation` was invoked.
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Bill an active subscription for its next period, as Stripe does at
    /// renewal. Returns the new invoice, or `None` if the subscription is
    /// unknown, cancelled, or its customer or plan is gone.
    pub fn renew_subscription(&self, subscription_id: &str) -> Option<Invoice> {
        let mut state = self.state.lock().unwrap();

        let sub = state
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id && s.status != SubscriptionStatus::Canceled)
            .cloned()?;
        let customer = state.active_customer(&sub.customer_id).cloned()?;
        let plan = state.plans.get(sub.plan_id.as_deref()?).cloned()?;

        let created = state.tick();
        Some(state.bill(&customer, &plan, &sub.id, created))
    }

    /// Forget recorded calls.
    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Every subscription ever created, including cancelled ones.
    pub fn all_subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    /// Ids of customers that were deleted.
    pub fn deleted_customer_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .customers
            .iter()
            .filter(|c| c.deleted)
            .map(|c| c.customer.id.clone())
            .collect()
    }

    fn record(&self, operation: &str) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation.to_string());

        if let Some(rule) = state.failures.get_mut(operation) {
            if rule.remaining_successes == 0 {
                return Err(GatewayError::new(operation, "Injected failure")
                    .with_status(rule.status)
                    .into());
            }
            rule.remaining_successes -= 1;
        }

        Ok(state)
    }
}

fn missing(operation: &str, what: &str, id: &str) -> GatewayError {
    GatewayError::new(operation, format!("No such {}: '{}'", what, id))
        .with_code("resource_missing")
        .with_status(404)
}

fn bad_request(operation: &str, message: impl Into<String>) -> GatewayError {
    GatewayError::new(operation, message).with_status(400)
}

/// Slice `items` the way Stripe pages a listing.
fn paginate<T: Identified + Clone>(
    operation: &str,
    items: Vec<T>,
    page: &ListParams,
) -> Result<Page<T>> {
    let start = match page.starting_after {
        Some(ref cursor) => {
            let pos = items
                .iter()
                .position(|i| i.id() == cursor)
                .ok_or_else(|| missing(operation, "object", cursor))?;
            pos + 1
        }
        None => 0,
    };

    let limit = usize::from(page.limit.clamp(1, MAX_PAGE_SIZE));
    let end = (start + limit).min(items.len());
    let has_more = end < items.len();

    Ok(Page::new(items[start..end].to_vec(), has_more))
}

fn card_brand(token: &str) -> Option<String> {
    let brand = match token {
        "tok_visa" | "tok_visa_debit" => "Visa",
        "tok_amex" => "American Express",
        "tok_mastercard" => "MasterCard",
        "tok_discover" => "Discover",
        _ => return None,
    };
    Some(brand.to_string())
}

impl CustomerGateway for InMemoryGateway {
    async fn create_customer(&self, request: NewCustomer) -> Result<Customer> {
        let mut state = self.record("create_customer")?;

        let customer = Customer {
            id: state.next_id("cus"),
            email: Some(request.email),
            description: Some(request.description),
            metadata: request.metadata,
            delinquent: false,
            default_source: None,
            coupon: None,
        };
        state.customers.push(StoredCustomer {
            customer: customer.clone(),
            deleted: false,
        });

        Ok(customer)
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        let state = self.record("retrieve_customer")?;
        Ok(state.active_customer(customer_id).cloned())
    }

    async fn list_customers(&self, query: CustomerQuery) -> Result<Page<Customer>> {
        let state = self.record("list_customers")?;

        let items: Vec<Customer> = state
            .customers
            .iter()
            .filter(|c| !c.deleted)
            .filter(|c| match query.email {
                Some(ref email) => c.customer.email.as_deref() == Some(email.as_str()),
                None => true,
            })
            .map(|c| c.customer.clone())
            .collect();

        paginate("list_customers", items, &query.page)
    }

    async fn update_customer(&self, customer_id: &str, update: CustomerUpdate) -> Result<Customer> {
        const OP: &str = "update_customer";
        let mut state = self.record(OP)?;

        if state.active_customer(customer_id).is_none() {
            return Err(missing(OP, "customer", customer_id).into());
        }

        if let Some(ref coupon_id) = update.coupon {
            if !state.coupons.iter().any(|c| &c.id == coupon_id) {
                return Err(missing(OP, "coupon", coupon_id).into());
            }
        }

        let new_card = match update.source {
            Some(ref token) => {
                if !token.starts_with("tok_") {
                    return Err(missing(OP, "token", token).into());
                }
                Some(Card {
                    id: state.next_id("card"),
                    customer_id: Some(customer_id.to_string()),
                    brand: card_brand(token),
                    last4: Some("4242".to_string()),
                })
            }
            None => None,
        };

        if let Some(ref card) = new_card {
            // A new source replaces every existing one.
            state
                .cards
                .insert(customer_id.to_string(), vec![card.clone()]);
        }

        let Some(customer) = state.active_customer_mut(customer_id) else {
            return Err(missing(OP, "customer", customer_id).into());
        };
        if let Some(email) = update.email {
            customer.email = Some(email);
        }
        if let Some(metadata) = update.metadata {
            customer.metadata.extend(metadata);
        }
        if let Some(card) = new_card {
            customer.default_source = Some(card.id);
        }
        if let Some(coupon) = update.coupon {
            customer.coupon = Some(coupon);
        }

        Ok(customer.clone())
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<()> {
        let mut state = self.record("delete_customer")?;

        let stored = state
            .customers
            .iter_mut()
            .find(|c| !c.deleted && c.customer.id == customer_id)
            .ok_or_else(|| missing("delete_customer", "customer", customer_id))?;
        stored.deleted = true;

        for sub in state
            .subscriptions
            .iter_mut()
            .filter(|s| s.customer_id == customer_id)
        {
            sub.status = SubscriptionStatus::Canceled;
        }

        Ok(())
    }
}

impl SubscriptionGateway for InMemoryGateway {
    async fn create_subscription(&self, request: NewSubscription) -> Result<Subscription> {
        const OP: &str = "create_subscription";
        let mut state = self.record(OP)?;

        let customer = state
            .active_customer(&request.customer_id)
            .cloned()
            .ok_or_else(|| missing(OP, "customer", &request.customer_id))?;
        let plan = state
            .plans
            .get(&request.plan_id)
            .cloned()
            .ok_or_else(|| missing(OP, "plan", &request.plan_id))?;
        if !customer.has_default_source() {
            return Err(bad_request(
                OP,
                "This customer has no attached payment source or default payment method.",
            )
            .into());
        }

        let created = state.tick();
        let subscription = Subscription {
            id: state.next_id("sub"),
            customer_id: customer.id.clone(),
            plan_id: Some(plan.id.clone()),
            status: SubscriptionStatus::Active,
            created,
        };

        state.bill(&customer, &plan, &subscription.id, created);
        state.subscriptions.push(subscription.clone());

        Ok(subscription)
    }

    async fn list_subscriptions(&self, query: SubscriptionQuery) -> Result<Page<Subscription>> {
        let state = self.record("list_subscriptions")?;

        let items: Vec<Subscription> = state
            .subscriptions
            .iter()
            .filter(|s| s.status != SubscriptionStatus::Canceled)
            .filter(|s| match query.customer_id {
                Some(ref id) => &s.customer_id == id,
                None => true,
            })
            .filter(|s| match query.plan_id {
                Some(ref id) => s.plan_id.as_ref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();

        paginate("list_subscriptions", items, &query.page)
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        const OP: &str = "cancel_subscription";
        let mut state = self.record(OP)?;

        let sub = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
            .ok_or_else(|| missing(OP, "subscription", subscription_id))?;
        if sub.status == SubscriptionStatus::Canceled {
            return Err(bad_request(OP, "This subscription has already been canceled.").into());
        }
        sub.status = SubscriptionStatus::Canceled;

        Ok(())
    }
}

impl CatalogGateway for InMemoryGateway {
    async fn retrieve_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        let state = self.record("retrieve_plan")?;
        Ok(state.plans.get(plan_id).cloned())
    }

    async fn retrieve_coupon(&self, coupon_id: &str) -> Result<Option<Coupon>> {
        let state = self.record("retrieve_coupon")?;
        Ok(state.coupons.iter().find(|c| c.id == coupon_id).cloned())
    }

    async fn list_coupons(&self, page: ListParams) -> Result<Page<Coupon>> {
        let state = self.record("list_coupons")?;
        paginate("list_coupons", state.coupons.clone(), &page)
    }
}

impl InvoiceGateway for InMemoryGateway {
    async fn list_invoices(&self, query: InvoiceQuery) -> Result<Page<Invoice>> {
        let state = self.record("list_invoices")?;

        let items: Vec<Invoice> = state
            .invoices
            .iter()
            .filter(|i| match query.subscription_id {
                Some(ref id) => i.subscription_id.as_ref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();

        paginate("list_invoices", items, &query.page)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Option<Charge>> {
        let state = self.record("retrieve_charge")?;
        Ok(state.charges.get(charge_id).cloned())
    }
}

impl PaymentSourceGateway for InMemoryGateway {
    async fn list_cards(&self, customer_id: &str, page: ListParams) -> Result<Page<Card>> {
        const OP: &str = "list_cards";
        let state = self.record(OP)?;

        if state.active_customer(customer_id).is_none() {
            return Err(missing(OP, "customer", customer_id).into());
        }
        let cards = state.cards.get(customer_id).cloned().unwrap_or_default();

        paginate(OP, cards, &page)
    }

    async fn delete_card(&self, customer_id: &str, card_id: &str) -> Result<()> {
        const OP: &str = "delete_card";
        let mut state = self.record(OP)?;

        let cards = state
            .cards
            .get_mut(customer_id)
            .ok_or_else(|| missing(OP, "source", card_id))?;
        let pos = cards
            .iter()
            .position(|c| c.id == card_id)
            .ok_or_else(|| missing(OP, "source", card_id))?;
        cards.remove(pos);
        let next_default = cards.first().map(|c| c.id.clone());

        if let Some(customer) = state.active_customer_mut(customer_id) {
            if customer.default_source.as_deref() == Some(card_id) {
                customer.default_source = next_default;
            }
        }

        Ok(())
    }
}
