//! Recurring subscriptions and monthly invoice generation

#[path = "../common/mod.rs"]
mod common;

use common::*;
use meus_clientes::jobs::generate_due_invoices;

#[test]
fn test_subscription_crud() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);

    let sub = queries::create_subscription(&conn, user.id, &new_subscription("Academia", 10, 9_900)).unwrap();
    assert_eq!(sub.day_of_month, 10);
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.last_generated_month.is_none());

    let mut paused = new_subscription("Academia Plus", 15, 12_000);
    paused.status = SubscriptionStatus::Paused;
    assert_eq!(queries::update_subscription(&conn, user.id, sub.id, &paused).unwrap(), 1);

    let fetched = queries::get_subscription(&conn, user.id, sub.id).unwrap().unwrap();
    assert_eq!(fetched.name, "Academia Plus");
    assert_eq!(fetched.value_cents, 12_000);
    assert_eq!(fetched.status, SubscriptionStatus::Paused);

    assert_eq!(queries::delete_subscription(&conn, user.id, sub.id).unwrap(), 1);
    assert!(queries::list_subscriptions(&conn, user.id).unwrap().is_empty());
}

#[test]
fn test_subscriptions_scoped_to_tenant() {
    let conn = setup_test_db();
    let owner = create_test_user(&conn, "owner@example.com", Plan::Pro);
    let other = create_test_user(&conn, "other@example.com", Plan::Pro);
    let sub = queries::create_subscription(&conn, owner.id, &new_subscription("Gym", 5, 1000)).unwrap();

    assert!(queries::get_subscription(&conn, other.id, sub.id).unwrap().is_none());
    assert_eq!(queries::delete_subscription(&conn, other.id, sub.id).unwrap(), 0);
    assert_eq!(queries::list_subscriptions(&conn, other.id).unwrap().len(), 0);
}

#[test]
fn test_generation_waits_for_billing_day() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    queries::create_subscription(&conn, user.id, &new_subscription("Gym", 20, 5_000)).unwrap();

    let generated = generate_due_invoices(&mut conn, date("2024-03-10"), None).unwrap();
    assert!(generated.is_empty(), "day 20 has not arrived on the 10th");

    let generated = generate_due_invoices(&mut conn, date("2024-03-20"), None).unwrap();
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].due_date, date("2024-03-20"));
    assert_eq!(generated[0].value_cents, 5_000);
    assert_eq!(generated[0].product.as_deref(), Some("Plano mensal"));
}

#[test]
fn test_generation_is_once_per_month() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    let sub = queries::create_subscription(&conn, user.id, &new_subscription("Gym", 1, 5_000)).unwrap();

    assert_eq!(generate_due_invoices(&mut conn, date("2024-03-05"), None).unwrap().len(), 1);
    assert_eq!(generate_due_invoices(&mut conn, date("2024-03-06"), None).unwrap().len(), 0);

    // Claiming again with a stale row is a no-op too
    assert!(queries::generate_subscription_invoice(&mut conn, &sub, date("2024-03-07")).unwrap().is_none());

    let sub = queries::get_subscription(&conn, user.id, sub.id).unwrap().unwrap();
    assert_eq!(sub.last_generated_month.as_deref(), Some("2024-03"));

    assert_eq!(generate_due_invoices(&mut conn, date("2024-04-01"), None).unwrap().len(), 1);
    assert_eq!(queries::count_invoices(&conn, user.id).unwrap(), 2);
}

#[test]
fn test_day_31_clamps_in_february() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    queries::create_subscription(&conn, user.id, &new_subscription("Rent", 31, 100_000)).unwrap();

    assert!(generate_due_invoices(&mut conn, date("2023-02-27"), None).unwrap().is_empty());
    let generated = generate_due_invoices(&mut conn, date("2023-02-28"), None).unwrap();
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].due_date, date("2023-02-28"));
}

#[test]
fn test_paused_subscriptions_and_tenant_scope() {
    let mut conn = setup_test_db();
    let a = create_test_user(&conn, "a@example.com", Plan::Pro);
    let b = create_test_user(&conn, "b@example.com", Plan::Pro);
    queries::create_subscription(&conn, a.id, &new_subscription("A", 1, 1000)).unwrap();
    queries::create_subscription(&conn, b.id, &new_subscription("B", 1, 1000)).unwrap();
    let mut paused = new_subscription("Paused", 1, 1000);
    paused.status = SubscriptionStatus::Paused;
    queries::create_subscription(&conn, a.id, &paused).unwrap();

    let generated = generate_due_invoices(&mut conn, date("2024-03-02"), Some(a.id)).unwrap();
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].user_id, a.id);

    let generated = generate_due_invoices(&mut conn, date("2024-03-02"), None).unwrap();
    assert_eq!(generated.len(), 1, "only B is left this month");
    assert_eq!(generated[0].user_id, b.id);
}
