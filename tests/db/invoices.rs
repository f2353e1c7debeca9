//! Invoices, the free-plan limit, reminder bookkeeping and dashboard stats

#[path = "../common/mod.rs"]
mod common;

use common::*;
use meus_clientes::error::AppError;

#[test]
fn test_create_and_get_invoice() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Free);

    let invoice = create_test_invoice(&mut conn, user.id, "Maria", date("2024-03-10"), 15_000);
    assert_eq!(invoice.user_id, user.id);
    assert_eq!(invoice.value_cents, 15_000);
    assert_eq!(invoice.status, InvoiceStatus::Pendente);
    assert!(invoice.paid_at.is_none());

    let fetched = queries::get_invoice(&conn, user.id, invoice.id).unwrap().unwrap();
    assert_eq!(fetched.name, "Maria");
    assert_eq!(fetched.due_date, date("2024-03-10"));
}

#[test]
fn test_invoices_are_scoped_to_their_tenant() {
    let mut conn = setup_test_db();
    let owner = create_test_user(&conn, "owner@example.com", Plan::Free);
    let other = create_test_user(&conn, "other@example.com", Plan::Free);
    let invoice = create_test_invoice(&mut conn, owner.id, "Maria", date("2024-03-10"), 1000);

    assert!(queries::get_invoice(&conn, other.id, invoice.id).unwrap().is_none());
    assert_eq!(queries::mark_invoice_paid(&conn, other.id, invoice.id, date("2024-03-10")).unwrap(), 0);
    assert_eq!(queries::delete_invoice(&conn, other.id, invoice.id).unwrap(), 0);
    assert!(queries::get_invoice(&conn, owner.id, invoice.id).unwrap().is_some());
}

#[test]
fn test_free_plan_limit_enforced() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "free@example.com", Plan::Free);
    let limit = Some(FREE_PLAN_INVOICE_LIMIT);

    for i in 0..FREE_PLAN_INVOICE_LIMIT {
        queries::create_invoice(
            &mut conn,
            user.id,
            limit,
            &new_invoice(&format!("Client {i}"), date("2024-03-10"), 1000),
        )
        .expect("invoices under the limit should be created");
    }

    let result = queries::create_invoice(
        &mut conn,
        user.id,
        limit,
        &new_invoice("One too many", date("2024-03-10"), 1000),
    );
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(queries::count_invoices(&conn, user.id).unwrap(), FREE_PLAN_INVOICE_LIMIT);

    queries::create_invoice(&mut conn, user.id, None, &new_invoice("Unlimited", date("2024-03-10"), 1000))
        .expect("no limit means no cap");
}

#[test]
fn test_list_invoices_filters_and_orders() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    let late = create_test_invoice(&mut conn, user.id, "Zeca", date("2024-03-20"), 1000);
    let early = create_test_invoice(&mut conn, user.id, "Ana Souza", date("2024-03-05"), 2000);
    let paid = create_test_invoice(&mut conn, user.id, "Bruno", date("2024-03-10"), 3000);
    queries::mark_invoice_paid(&conn, user.id, paid.id, date("2024-03-09")).unwrap();

    let all = queries::list_invoices(&conn, user.id, &InvoiceFilter::default()).unwrap();
    let ids: Vec<i64> = all.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![early.id, paid.id, late.id], "ordered by due date");

    let pending = queries::list_invoices(
        &conn,
        user.id,
        &InvoiceFilter { status: Some("Pendente".into()), search: None },
    )
    .unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|i| !i.is_paid()));

    let search = queries::list_invoices(
        &conn,
        user.id,
        &InvoiceFilter { status: Some("Todos".into()), search: Some("souza".into()) },
    )
    .unwrap();
    assert_eq!(search.len(), 1);
    assert_eq!(search[0].id, early.id);
}

#[test]
fn test_update_and_mark_paid() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Free);
    let invoice = create_test_invoice(&mut conn, user.id, "Maria", date("2024-03-10"), 1000);

    let mut changed = new_invoice("Maria Silva", date("2024-04-10"), 2500);
    changed.email = Some("maria@example.com".into());
    assert_eq!(queries::update_invoice(&conn, user.id, invoice.id, &changed).unwrap(), 1);

    assert_eq!(queries::mark_invoice_paid(&conn, user.id, invoice.id, date("2024-04-01")).unwrap(), 1);

    let invoice = queries::get_invoice(&conn, user.id, invoice.id).unwrap().unwrap();
    assert_eq!(invoice.name, "Maria Silva");
    assert_eq!(invoice.email.as_deref(), Some("maria@example.com"));
    assert_eq!(invoice.value_cents, 2500);
    assert_eq!(invoice.status, InvoiceStatus::Pago);
    assert_eq!(invoice.paid_at, Some(date("2024-04-01")));
}

#[test]
fn test_reminder_candidates_cover_three_windows() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    let today = date("2024-03-10");

    let upcoming = create_test_invoice(&mut conn, user.id, "Upcoming", date("2024-03-12"), 1000);
    let due = create_test_invoice(&mut conn, user.id, "Due", date("2024-03-10"), 1000);
    let overdue = create_test_invoice(&mut conn, user.id, "Overdue", date("2024-03-09"), 1000);
    create_test_invoice(&mut conn, user.id, "Tomorrow", date("2024-03-11"), 1000);
    create_test_invoice(&mut conn, user.id, "Long ago", date("2024-02-01"), 1000);
    let paid = create_test_invoice(&mut conn, user.id, "Paid", date("2024-03-10"), 1000);
    queries::mark_invoice_paid(&conn, user.id, paid.id, today).unwrap();

    let mut ids: Vec<i64> = queries::list_reminder_candidates(&conn, today)
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![upcoming.id, due.id, overdue.id]);
}

#[test]
fn test_reminded_invoice_skipped_for_the_day() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    let today = date("2024-03-10");
    let invoice = create_test_invoice(&mut conn, user.id, "Due", today, 1000);

    queries::record_reminder(&conn, invoice.id, today, ReminderKind::DueToday).unwrap();
    assert!(queries::list_reminder_candidates(&conn, today).unwrap().is_empty());

    let invoice = queries::get_invoice(&conn, user.id, invoice.id).unwrap().unwrap();
    assert_eq!(invoice.last_reminder_on, Some(today));
    assert_eq!(invoice.last_reminder_kind, Some(ReminderKind::DueToday));

    // The next day it is one day late and due for the overdue reminder
    let tomorrow = date("2024-03-11");
    assert_eq!(queries::list_reminder_candidates(&conn, tomorrow).unwrap().len(), 1);
}

#[test]
fn test_invoice_stats() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);
    let today = date("2024-03-15");

    create_test_invoice(&mut conn, user.id, "Late", date("2024-03-01"), 10_000);
    create_test_invoice(&mut conn, user.id, "Soon", date("2024-03-20"), 5_000);
    let paid = create_test_invoice(&mut conn, user.id, "Paid", date("2024-03-10"), 7_000);
    queries::mark_invoice_paid(&conn, user.id, paid.id, date("2024-03-10")).unwrap();
    create_test_invoice(&mut conn, user.id, "Next month", date("2024-04-05"), 3_000);
    queries::create_subscription(&conn, user.id, &new_subscription("Gym", 5, 9_900)).unwrap();

    let stats = queries::invoice_stats(&conn, user.id, today).unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.pending_count, 3);
    assert_eq!(stats.pending_value, 18_000);
    assert_eq!(stats.overdue_value, 10_000);
    assert_eq!(stats.total_received, 7_000);
    assert_eq!(stats.month_received, 7_000);
    assert_eq!(stats.month_projected, 22_000);
    assert_eq!(stats.recurring, 9_900);
}

#[test]
fn test_share_ids_are_short_hex() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "tenant@example.com", Plan::Pro);

    let share = queries::create_share(
        &conn,
        Some(user.id),
        &CreateShare {
            client_name: "Maria".into(),
            value: "R$ 150,00".into(),
            due_date: "10/03/2024".into(),
            logo: Some("  ".into()),
        },
    )
    .unwrap();

    assert_eq!(share.id.len(), 8);
    assert!(share.id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(share.logo, None, "blank logos are not stored");

    let fetched = queries::get_share(&conn, &share.id).unwrap().unwrap();
    assert_eq!(fetched.client_name, "Maria");
    assert_eq!(fetched.user_id, Some(user.id));
}
