use crate::error::{Result, StripeServiceError};
use crate::gateway::{Charge, Coupon, Customer, CustomerUpdate, Gateway, Invoice, InvoiceQuery};

use super::{LOG_TARGET, StripeService, require};

impl<G: Gateway> StripeService<G> {
    /// Apply a coupon to a customer's future invoices.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `coupon_id` is empty
    /// - `InvalidCoupon` if the coupon cannot be retrieved
    /// - `NotFound` if the customer does not exist
    pub async fn apply_coupon_to_customer(&self, customer_id: &str, coupon_id: &str) -> Result<Customer> {
        require("coupon", coupon_id)?;

        match self.gateway.retrieve_coupon(coupon_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(StripeServiceError::InvalidCoupon {
                    coupon_id: coupon_id.to_string(),
                    source: None,
                });
            }
            Err(err) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    coupon_id = coupon_id,
                    error = %err,
                    "Coupon lookup failed"
                );
                let source = match err {
                    StripeServiceError::Gateway(gateway) => Some(gateway),
                    _ => None,
                };
                return Err(StripeServiceError::InvalidCoupon {
                    coupon_id: coupon_id.to_string(),
                    source,
                });
            }
        }

        self.resolve_customer(customer_id).await?;
        let customer = self
            .gateway
            .update_customer(
                customer_id,
                CustomerUpdate {
                    coupon: Some(coupon_id.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            target: LOG_TARGET,
            customer_id = customer_id,
            coupon_id = coupon_id,
            "Applied coupon"
        );
        Ok(customer)
    }

    pub async fn list_all_coupons(&self) -> Result<Vec<Coupon>> {
        let gateway = &self.gateway;
        self.paginator
            .collect_all("coupons", move |page| gateway.list_coupons(page))
            .await
    }

    pub async fn list_all_invoices(&self) -> Result<Vec<Invoice>> {
        self.invoices(None).await
    }

    /// The subscription's invoice with the latest creation time.
    ///
    /// Among invoices created at the same second, the first one listed wins.
    pub async fn get_latest_invoice_for_subscription(&self, subscription_id: &str) -> Result<Option<Invoice>> {
        if subscription_id.is_empty() {
            return Ok(None);
        }

        let invoices = self.invoices(Some(subscription_id)).await?;
        Ok(invoices.into_iter().fold(None, |latest, invoice| match latest {
            Some(l) if l.created >= invoice.created => Some(l),
            _ => Some(invoice),
        }))
    }

    /// # Errors
    ///
    /// `NotFound` if no charge has this id.
    pub async fn get_charge(&self, charge_id: &str) -> Result<Charge> {
        require("charge id", charge_id)?;

        let charge = self
            .gateway
            .retrieve_charge(charge_id)
            .await?
            .ok_or_else(|| StripeServiceError::not_found(format!("Charge '{}'", charge_id)))?;

        tracing::debug!(
            target: LOG_TARGET,
            charge_id = charge_id,
            status = %charge.status,
            "Retrieved charge"
        );
        Ok(charge)
    }

    async fn invoices(&self, subscription_id: Option<&str>) -> Result<Vec<Invoice>> {
        let gateway = &self.gateway;
        self.paginator
            .collect_all("invoices", move |page| {
                gateway.list_invoices(InvoiceQuery {
                    subscription_id: subscription_id.map(str::to_string),
                    page,
                })
            })
            .await
    }
}
