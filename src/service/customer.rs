use std::collections::HashMap;

use crate::error::{Result, StripeServiceError};
use crate::gateway::{
    Customer, CustomerQuery, CustomerSummary, CustomerUpdate, Gateway, META_CATEGORY, NewCustomer,
};

use super::{LOG_TARGET, StripeService, at_most_one, require};

impl<G: Gateway> StripeService<G> {
    /// Create a customer without a category. Returns the new customer's id.
    pub async fn create_customer(&self, email: &str, description: &str) -> Result<String> {
        self.create_customer_with_category(email, description, None).await
    }

    /// Create a customer, tagging it with `category` when one is given.
    /// An empty category counts as none.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `email` or `description` is empty
    /// - `DuplicateEmail` if an active customer already uses `email`
    /// - `InternalInconsistency` / `AmbiguousResult` if the created customer
    ///   cannot be found again by email
    pub async fn create_customer_with_category(
        &self,
        email: &str,
        description: &str,
        category: Option<&str>,
    ) -> Result<String> {
        require("email", email)?;
        require("description", description)?;

        if !self.customers_with_email(email).await?.is_empty() {
            return Err(StripeServiceError::DuplicateEmail {
                email: email.to_string(),
            });
        }

        let category = category.filter(|c| !c.is_empty());
        let metadata: HashMap<String, String> = category
            .map(|c| (META_CATEGORY.to_string(), c.to_string()))
            .into_iter()
            .collect();

        self.gateway
            .create_customer(NewCustomer {
                email: email.to_string(),
                description: description.to_string(),
                metadata,
            })
            .await?;

        let created = at_most_one("customer", format!("email {}", email), self.customers_with_email(email).await?)?
            .ok_or_else(|| {
                StripeServiceError::internal(format!("Customer with email '{}' missing after creation", email))
            })?;

        tracing::info!(
            target: LOG_TARGET,
            customer_id = %created.id,
            category = category.unwrap_or(""),
            "Created customer"
        );

        Ok(created.id)
    }

    /// Look a customer up by id. Empty, unknown and deleted ids yield `None`.
    pub async fn retrieve_customer_by_id(&self, customer_id: &str) -> Result<Option<Customer>> {
        if customer_id.is_empty() {
            return Ok(None);
        }
        self.gateway.retrieve_customer(customer_id).await
    }

    /// Look a customer up by exact email.
    ///
    /// # Errors
    ///
    /// `AmbiguousResult` if more than one active customer has this email.
    pub async fn retrieve_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        if email.is_empty() {
            return Ok(None);
        }
        at_most_one("customer", format!("email {}", email), self.customers_with_email(email).await?)
    }

    pub async fn list_all_customers(&self) -> Result<Vec<CustomerSummary>> {
        let gateway = &self.gateway;
        self.paginator
            .collect_with(
                "customers",
                move |page| gateway.list_customers(CustomerQuery { email: None, page }),
                |c: Customer| Some(CustomerSummary::from(c)),
            )
            .await
    }

    /// Customers whose `category` metadata equals `category`.
    pub async fn list_all_customers_by_category(&self, category: &str) -> Result<Vec<CustomerSummary>> {
        let gateway = &self.gateway;
        self.paginator
            .collect_with(
                "customers",
                move |page| gateway.list_customers(CustomerQuery { email: None, page }),
                |c: Customer| (c.category() == Some(category)).then(|| CustomerSummary::from(c)),
            )
            .await
    }

    pub async fn update_customer_category(&self, customer_id: &str, category: &str) -> Result<Customer> {
        require("category", category)?;
        self.resolve_customer(customer_id).await?;

        let metadata = HashMap::from([(META_CATEGORY.to_string(), category.to_string())]);
        self.gateway
            .update_customer(
                customer_id,
                CustomerUpdate {
                    metadata: Some(metadata),
                    ..Default::default()
                },
            )
            .await
    }

    /// Delete a customer. Stripe keeps its history.
    pub async fn delete_customer(&self, customer_id: &str) -> Result<()> {
        self.resolve_customer(customer_id).await?;
        self.gateway.delete_customer(customer_id).await?;

        tracing::info!(target: LOG_TARGET, customer_id = customer_id, "Deleted customer");
        Ok(())
    }

    /// Delete every customer, one at a time. Returns the number deleted.
    ///
    /// Stops at the first failure; customers deleted before it stay deleted.
    pub async fn delete_all_customers(&self) -> Result<usize> {
        let gateway = &self.gateway;
        let ids = self
            .paginator
            .collect_with(
                "customers",
                move |page| gateway.list_customers(CustomerQuery { email: None, page }),
                |c: Customer| Some(c.id),
            )
            .await?;

        let mut deleted = 0;
        for id in &ids {
            if let Err(err) = self.gateway.delete_customer(id).await {
                tracing::warn!(
                    target: LOG_TARGET,
                    customer_id = %id,
                    deleted = deleted,
                    remaining = ids.len() - deleted,
                    error = %err,
                    "Bulk customer deletion stopped"
                );
                return Err(err);
            }
            deleted += 1;
        }

        tracing::info!(target: LOG_TARGET, deleted = deleted, "Deleted all customers");
        Ok(deleted)
    }

    /// Change a customer's email. Re-applying the customer's own email is allowed.
    pub async fn change_customer_email(&self, customer_id: &str, new_email: &str) -> Result<Customer> {
        require("email", new_email)?;

        let holders = self.customers_with_email(new_email).await?;
        if holders.iter().any(|c| c.id != customer_id) {
            return Err(StripeServiceError::DuplicateEmail {
                email: new_email.to_string(),
            });
        }

        self.resolve_customer(customer_id).await?;
        self.gateway
            .update_customer(
                customer_id,
                CustomerUpdate {
                    email: Some(new_email.to_string()),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn is_customer_delinquent(&self, customer_id: &str) -> Result<bool> {
        Ok(self.resolve_customer(customer_id).await?.delinquent)
    }

    /// Whether the customer has a default payment source. Unknown customers have none.
    pub async fn does_customer_have_active_payment_source(&self, customer_id: &str) -> Result<bool> {
        Ok(self
            .retrieve_customer_by_id(customer_id)
            .await?
            .is_some_and(|c| c.has_default_source()))
    }

    async fn customers_with_email(&self, email: &str) -> Result<Vec<Customer>> {
        tracing::debug!(target: LOG_TARGET, email = email, "Looking up customers by email");

        let gateway = &self.gateway;
        self.paginator
            .collect_all("customers_by_email", move |page| {
                gateway.list_customers(CustomerQuery {
                    email: Some(email.to_string()),
                    page,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::gateway::{CustomerGateway, InMemoryGateway, NewCustomer};
    use crate::StripeService;

    fn service() -> StripeService<InMemoryGateway> {
        StripeService::new(InMemoryGateway::new())
    }

    #[tokio::test]
    async fn test_create_validates_locally() {
        let service = service();

        let err = service.create_customer("", "desc").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = service.create_customer("a@example.com", "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(service.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_retrieve() {
        let service = service();
        let id = service
            .create_customer_with_category("a@example.com", "Alice", Some("CAT1"))
            .await
            .unwrap();

        let customer = service.retrieve_customer_by_id(&id).await.unwrap().unwrap();
        assert_eq!(customer.email.as_deref(), Some("a@example.com"));
        assert_eq!(customer.category(), Some("CAT1"));

        let by_email = service.retrieve_customer_by_email("a@example.com").await.unwrap();
        assert_eq!(by_email.map(|c| c.id), Some(id));
    }

    #[tokio::test]
    async fn test_create_without_category_has_no_metadata() {
        let service = service();
        let plain = service.create_customer("a@example.com", "Alice").await.unwrap();
        let none = service
            .create_customer_with_category("b@example.com", "Bob", None)
            .await
            .unwrap();
        let empty = service
            .create_customer_with_category("c@example.com", "Carol", Some(""))
            .await
            .unwrap();

        for id in [plain, none, empty] {
            let customer = service.retrieve_customer_by_id(&id).await.unwrap().unwrap();
            assert!(customer.metadata.is_empty());
            assert_eq!(customer.category(), None);
        }
    }

    #[tokio::test]
    async fn test_empty_id_makes_no_remote_call() {
        let service = service();
        assert!(service.retrieve_customer_by_id("").await.unwrap().is_none());
        assert!(service.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let service = service();
        // Stripe itself does not enforce unique emails.
        service
            .gateway()
            .create_customer(NewCustomer {
                email: "dup@example.com".to_string(),
                description: "first".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = service.create_customer("dup@example.com", "second").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEmail);
    }

    #[tokio::test]
    async fn test_change_email_to_own_email() {
        let service = service();
        let id = service.create_customer("a@example.com", "Alice").await.unwrap();

        let updated = service.change_customer_email(&id, "a@example.com").await.unwrap();
        assert_eq!(updated.email.as_deref(), Some("a@example.com"));

        let updated = service.change_customer_email(&id, "alice@example.com").await.unwrap();
        assert_eq!(updated.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_change_email_conflicts() {
        let service = service();
        let a = service.create_customer("a@example.com", "Alice").await.unwrap();
        service.create_customer("b@example.com", "Bob").await.unwrap();

        let err = service.change_customer_email(&a, "b@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEmail);

        let err = service.change_customer_email(&a, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service.change_customer_email("cus_missing", "c@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_category_requires_value_and_customer() {
        let service = service();
        let id = service.create_customer("a@example.com", "Alice").await.unwrap();

        let err = service.update_customer_category(&id, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service.update_customer_category("cus_missing", "CAT").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_customer() {
        let service = service();
        let id = service.create_customer("a@example.com", "Alice").await.unwrap();

        service.delete_customer(&id).await.unwrap();
        assert!(service.retrieve_customer_by_id(&id).await.unwrap().is_none());

        let err = service.delete_customer(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The email is free again once the holder is deleted.
        assert!(service.create_customer("a@example.com", "Alice again").await.is_ok());
    }

    #[tokio::test]
    async fn test_delinquency() {
        let service = service();
        let id = service.create_customer("a@example.com", "Alice").await.unwrap();
        assert!(!service.is_customer_delinquent(&id).await.unwrap());

        service.gateway().set_delinquent(&id, true);
        assert!(service.is_customer_delinquent(&id).await.unwrap());

        let err = service.is_customer_delinquent("cus_missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_customer_has_no_source() {
        let service = service();
        assert!(!service.does_customer_have_active_payment_source("cus_missing").await.unwrap());
    }
}
