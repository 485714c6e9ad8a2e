use crate::error::{Result, StripeServiceError};
use crate::gateway::{Gateway, NewSubscription, Subscription, SubscriptionQuery};

use super::{LOG_TARGET, StripeService, at_most_one};

impl<G: Gateway> StripeService<G> {
    /// Subscribe a customer to `plan_id`, replacing any current subscription.
    ///
    /// The subscription charges automatically, so Stripe bills the customer's
    /// default source immediately.
    ///
    /// # Errors
    ///
    /// - `InvalidPlan` if the plan cannot be retrieved (checked first)
    /// - `NotFound` if the customer does not exist
    /// - `NoPaymentSource` if the customer has no default source
    /// - `AmbiguousResult` / `InternalInconsistency` if the new subscription
    ///   cannot be found again afterwards
    pub async fn create_subscription_and_charge(&self, customer_id: &str, plan_id: &str) -> Result<Subscription> {
        if !self.is_plan_valid(plan_id).await {
            return Err(StripeServiceError::InvalidPlan {
                plan_id: plan_id.to_string(),
            });
        }

        let customer = self.resolve_customer(customer_id).await?;
        if !customer.has_default_source() {
            return Err(StripeServiceError::NoPaymentSource {
                customer_id: customer_id.to_string(),
            });
        }

        self.cancel_all_existing_subscriptions_for_customer(customer_id)
            .await?;

        self.gateway
            .create_subscription(NewSubscription {
                customer_id: customer_id.to_string(),
                plan_id: plan_id.to_string(),
            })
            .await?;

        let subscription = self
            .get_subscription_by_customer_and_plan(customer_id, plan_id)
            .await?
            .ok_or_else(|| {
                StripeServiceError::internal(format!(
                    "Subscription of customer '{}' to plan '{}' missing after creation",
                    customer_id, plan_id
                ))
            })?;

        tracing::info!(
            target: LOG_TARGET,
            customer_id = customer_id,
            plan_id = plan_id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Created subscription"
        );

        // The customer has been charged by now; the invoice only feeds the log.
        match self.get_latest_invoice_for_subscription(&subscription.id).await {
            Ok(Some(invoice)) => {
                tracing::info!(
                    target: LOG_TARGET,
                    subscription_id = %subscription.id,
                    invoice_id = %invoice.id,
                    amount_paid = %format_amount(invoice.amount_paid),
                    currency = invoice.currency.as_deref().unwrap_or(""),
                    "Charged customer"
                );
            }
            Ok(None) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    subscription_id = %subscription.id,
                    "No invoice found for new subscription"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    subscription_id = %subscription.id,
                    error = %err,
                    "Could not fetch invoice for new subscription"
                );
            }
        }

        Ok(subscription)
    }

    /// Same as [`create_subscription_and_charge`](Self::create_subscription_and_charge),
    /// addressing the customer by email.
    pub async fn create_subscription_for_customer_and_charge(&self, email: &str, plan_id: &str) -> Result<Subscription> {
        let customer = self
            .retrieve_customer_by_email(email)
            .await?
            .ok_or_else(|| StripeServiceError::not_found(format!("Customer with email '{}'", email)))?;

        self.create_subscription_and_charge(&customer.id, plan_id).await
    }

    /// Cancel the customer's subscriptions. Returns the number cancelled.
    pub async fn cancel_all_existing_subscriptions_for_customer(&self, customer_id: &str) -> Result<usize> {
        let subscriptions = self.get_all_subscriptions_by_customer(customer_id).await?;

        for sub in &subscriptions {
            self.gateway.cancel_subscription(&sub.id).await?;
            tracing::info!(
                target: LOG_TARGET,
                customer_id = customer_id,
                subscription_id = %sub.id,
                "Cancelled subscription"
            );
        }

        Ok(subscriptions.len())
    }

    pub async fn get_subscription_by_customer_and_plan(
        &self,
        customer_id: &str,
        plan_id: &str,
    ) -> Result<Option<Subscription>> {
        let found = self
            .subscriptions(SubscriptionQuery {
                customer_id: Some(customer_id.to_string()),
                plan_id: Some(plan_id.to_string()),
                ..Default::default()
            })
            .await?;

        at_most_one(
            "subscription",
            format!("customer {} and plan {}", customer_id, plan_id),
            found,
        )
    }

    /// The customer's subscriptions: empty or a single entry.
    pub async fn get_all_subscriptions_by_customer(&self, customer_id: &str) -> Result<Vec<Subscription>> {
        let found = self
            .subscriptions(SubscriptionQuery {
                customer_id: Some(customer_id.to_string()),
                ..Default::default()
            })
            .await?;

        let one = at_most_one("subscription", format!("customer {}", customer_id), found)?;
        Ok(one.into_iter().collect())
    }

    /// Whether the plan exists. Any retrieval failure counts as invalid.
    pub async fn is_plan_valid(&self, plan_id: &str) -> bool {
        if plan_id.is_empty() {
            return false;
        }

        match self.gateway.retrieve_plan(plan_id).await {
            Ok(plan) => plan.is_some(),
            Err(err) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    plan_id = plan_id,
                    error = %err,
                    "Plan lookup failed, treating plan as invalid"
                );
                false
            }
        }
    }

    async fn subscriptions(&self, query: SubscriptionQuery) -> Result<Vec<Subscription>> {
        let gateway = &self.gateway;
        self.paginator
            .collect_all("subscriptions", move |page| {
                gateway.list_subscriptions(SubscriptionQuery {
                    page,
                    ..query.clone()
                })
            })
            .await
    }
}

/// Minor units to a two-decimal major-unit string.
fn format_amount(minor: i64) -> String {
    format!("{:.2}", minor as f64 / 100.0)
}
