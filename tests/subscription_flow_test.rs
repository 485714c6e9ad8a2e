use stripe_service::{ChargeStatus, ErrorKind, InMemoryGateway, StripeService, SubscriptionStatus};

async fn customer_with_card(plans: &[(&str, i64)]) -> (StripeService<InMemoryGateway>, String) {
    let mut gateway = InMemoryGateway::new().with_percent_off_coupon("TENOFF", 10.0);
    for (plan, amount) in plans {
        gateway = gateway.with_plan(*plan, *amount);
    }
    let service = StripeService::new(gateway);

    let id = service.create_customer("sub@example.com", "Subscriber").await.unwrap();
    service.replace_payment_source_for_customer(&id, "tok_visa").await.unwrap();
    (service, id)
}

#[tokio::test]
async fn test_subscribe_without_payment_source() {
    let service = StripeService::new(InMemoryGateway::new().with_plan("monthly", 100));
    let id = service.create_customer("nocard@example.com", "No card").await.unwrap();

    let err = service.create_subscription_and_charge(&id, "monthly").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoPaymentSource);
    assert_eq!(service.gateway().call_count("create_subscription"), 0);
    assert!(service.get_all_subscriptions_by_customer(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_to_invalid_plan_has_no_side_effects() {
    let (service, id) = customer_with_card(&[("monthly", 100)]).await;
    service.create_subscription_and_charge(&id, "monthly").await.unwrap();
    service.gateway().reset_calls();

    let err = service.create_subscription_and_charge(&id, "no-such-plan").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPlan);
    assert_eq!(service.gateway().calls(), vec!["retrieve_plan".to_string()]);

    // The existing subscription is untouched.
    let subs = service.get_all_subscriptions_by_customer(&id).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].plan_id.as_deref(), Some("monthly"));
}

#[tokio::test]
async fn test_resubscribe_replaces_plan() {
    let (service, id) = customer_with_card(&[("monthly", 100), ("yearly", 1_000)]).await;

    let first = service.create_subscription_and_charge(&id, "monthly").await.unwrap();
    let second = service.create_subscription_and_charge(&id, "yearly").await.unwrap();
    assert_ne!(first.id, second.id);

    let subs = service.get_all_subscriptions_by_customer(&id).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].id, second.id);
    assert_eq!(subs[0].plan_id.as_deref(), Some("yearly"));

    assert!(service
        .get_subscription_by_customer_and_plan(&id, "monthly")
        .await
        .unwrap()
        .is_none());

    let history = service.gateway().all_subscriptions();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, SubscriptionStatus::Canceled);
}

#[tokio::test]
async fn test_coupon_discounts_next_invoice() {
    let (service, id) = customer_with_card(&[("monthly", 100)]).await;
    service.apply_coupon_to_customer(&id, "TENOFF").await.unwrap();

    let sub = service.create_subscription_and_charge(&id, "monthly").await.unwrap();
    let invoice = service
        .get_latest_invoice_for_subscription(&sub.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(invoice.amount_paid, 90);
    assert_eq!(invoice.subscription_id.as_deref(), Some(sub.id.as_str()));

    let charge = service.get_charge(invoice.charge_id.as_deref().unwrap()).await.unwrap();
    assert_eq!(charge.status, ChargeStatus::Succeeded);
    assert_eq!(charge.amount, 90);
}

#[tokio::test]
async fn test_latest_invoice_is_newest() {
    let (service, id) = customer_with_card(&[("monthly", 100)]).await;
    let sub = service.create_subscription_and_charge(&id, "monthly").await.unwrap();

    // The renewal is billed after the coupon, so the two invoices differ.
    service.apply_coupon_to_customer(&id, "TENOFF").await.unwrap();
    let renewal = service.gateway().renew_subscription(&sub.id).unwrap();

    let all = service.list_all_invoices().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].amount_paid, 100);
    assert!(all[0].created < renewal.created);

    let latest = service
        .get_latest_invoice_for_subscription(&sub.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, renewal.id);
    assert_eq!(latest.amount_paid, 90);
}

#[tokio::test]
async fn test_payment_source_lifecycle() {
    let (service, id) = customer_with_card(&[]).await;
    assert!(service.does_customer_have_active_payment_source(&id).await.unwrap());

    assert_eq!(service.remove_payment_source_from_customer(&id).await.unwrap(), 1);
    assert!(!service.does_customer_have_active_payment_source(&id).await.unwrap());

    service.replace_payment_source_for_customer(&id, "tok_mastercard").await.unwrap();
    assert!(service.does_customer_have_active_payment_source(&id).await.unwrap());
}

#[tokio::test]
async fn test_subscribe_by_email_end_to_end() {
    let (service, id) = customer_with_card(&[("monthly", 2_500)]).await;

    let sub = service
        .create_subscription_for_customer_and_charge("sub@example.com", "monthly")
        .await
        .unwrap();
    assert_eq!(sub.customer_id, id);
    assert_eq!(sub.status, SubscriptionStatus::Active);

    let found = service
        .get_subscription_by_customer_and_plan(&id, "monthly")
        .await
        .unwrap();
    assert_eq!(found.map(|s| s.id), Some(sub.id));
}

#[tokio::test]
async fn test_deleted_customer_cannot_subscribe() {
    let (service, id) = customer_with_card(&[("monthly", 100)]).await;
    service.delete_customer(&id).await.unwrap();

    let err = service.create_subscription_and_charge(&id, "monthly").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
