use crate::error::Result;
use crate::gateway::{Card, Customer, CustomerUpdate, Gateway, MAX_PAGE_SIZE};
use crate::pagination::Paginator;

use super::{LOG_TARGET, StripeService, require};

impl<G: Gateway> StripeService<G> {
    /// Make the card behind `token` the customer's default source, superseding
    /// the previous one.
    pub async fn replace_payment_source_for_customer(&self, customer_id: &str, token: &str) -> Result<Customer> {
        require("token", token)?;
        self.resolve_customer(customer_id).await?;

        let customer = self
            .gateway
            .update_customer(
                customer_id,
                CustomerUpdate {
                    source: Some(token.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            target: LOG_TARGET,
            customer_id = customer_id,
            source = ?customer.default_source,
            "Replaced payment source"
        );
        Ok(customer)
    }

    /// Delete every card attached to the customer. Returns the number removed.
    ///
    /// Cards are deleted one by one; a failure leaves earlier deletions in place.
    pub async fn remove_payment_source_from_customer(&self, customer_id: &str) -> Result<usize> {
        self.resolve_customer(customer_id).await?;

        let gateway = &self.gateway;
        let cards = Paginator::new(MAX_PAGE_SIZE, self.paginator.stop_rule())
            .collect_all("cards", move |page| gateway.list_cards(customer_id, page))
            .await?;

        for card in &cards {
            self.gateway.delete_card(customer_id, &card.id).await?;
            tracing::debug!(
                target: LOG_TARGET,
                customer_id = customer_id,
                card = %card_label(card),
                "Deleted card"
            );
        }

        tracing::info!(
            target: LOG_TARGET,
            customer_id = customer_id,
            removed = cards.len(),
            "Removed payment sources"
        );
        Ok(cards.len())
    }
}

fn card_label(card: &Card) -> String {
    format!(
        "{} ending {}",
        card.brand.as_deref().unwrap_or("card"),
        card.last4.as_deref().unwrap_or("????")
    )
}
