//! Tenant accounts, admin visibility and sessions

#[path = "../common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_create_user_normalizes_email() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "  Maria@Example.COM ", Plan::Free);

    assert_eq!(user.email, "maria@example.com");
    assert_eq!(user.plan, Plan::Free);
    assert_eq!(user.role, Role::User);
    assert_eq!(user.status, AccountStatus::Active);
    assert!(!user.is_master);

    let fetched = queries::get_user_by_email(&conn, "maria@example.com")
        .unwrap()
        .expect("user should be found by email");
    assert_eq!(fetched.id, user.id);
}

#[test]
fn test_duplicate_email_rejected() {
    let conn = setup_test_db();
    create_test_user(&conn, "dup@example.com", Plan::Free);

    let hash = hash_password(TEST_PASSWORD).unwrap();
    let result = queries::create_user(
        &conn,
        &NewUser {
            name: "Other",
            email: "DUP@example.com",
            password_hash: &hash,
            whatsapp: None,
            cpf: None,
            plan: Plan::Free,
            role: Role::User,
            is_master: false,
            owner_id: None,
            created_at: date("2024-01-01"),
        },
    );
    assert!(result.is_err(), "emails are unique regardless of case");
}

#[test]
fn test_credentials_return_password_hash() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "login@example.com", Plan::Pro);

    let (found, hash) = queries::get_user_credentials(&conn, "login@example.com")
        .unwrap()
        .expect("credentials should exist");
    assert_eq!(found.id, user.id);
    assert!(meus_clientes::crypto::verify_password(TEST_PASSWORD, &hash));
    assert!(!meus_clientes::crypto::verify_password("wrong-password", &hash));

    assert!(queries::get_user_credentials(&conn, "missing@example.com").unwrap().is_none());
}

#[test]
fn test_master_sees_everyone_admin_sees_own_tenants() {
    let conn = setup_test_db();
    let master = create_master_admin(&conn, "master@example.com");
    let admin = create_test_admin(&conn, "admin@example.com");
    let owned = create_owned_user(&conn, "owned@example.com", admin.id);
    let stranger = create_test_user(&conn, "stranger@example.com", Plan::Free);

    let all = queries::list_users_for_admin(&conn, &master).unwrap();
    assert_eq!(all.len(), 4);

    let scoped: Vec<i64> = queries::list_users_for_admin(&conn, &admin)
        .unwrap()
        .into_iter()
        .map(|row| row.user.id)
        .collect();
    assert_eq!(scoped, vec![admin.id, owned.id]);

    assert!(queries::get_user_visible_to(&conn, &admin, owned.id).unwrap().is_some());
    assert!(queries::get_user_visible_to(&conn, &admin, stranger.id).unwrap().is_none());
    assert!(queries::get_user_visible_to(&conn, &master, stranger.id).unwrap().is_some());
}

#[test]
fn test_client_count_in_admin_listing() {
    let mut conn = setup_test_db();
    let master = create_master_admin(&conn, "master@example.com");
    let tenant = create_test_user(&conn, "tenant@example.com", Plan::Free);
    create_test_invoice(&mut conn, tenant.id, "A", date("2024-03-10"), 1000);
    create_test_invoice(&mut conn, tenant.id, "B", date("2024-03-11"), 2000);

    let rows = queries::list_users_for_admin(&conn, &master).unwrap();
    let row = rows.iter().find(|r| r.user.id == tenant.id).unwrap();
    assert_eq!(row.client_count, 2);
}

#[test]
fn test_session_lifecycle() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "session@example.com", Plan::Free);

    let token = queries::create_session(&conn, user.id, 30).unwrap();
    let found = queries::get_user_by_session(&conn, &token)
        .unwrap()
        .expect("session should resolve to its user");
    assert_eq!(found.id, user.id);

    assert!(queries::get_user_by_session(&conn, "not-a-token").unwrap().is_none());

    assert!(queries::delete_session(&conn, &token).unwrap());
    assert!(queries::get_user_by_session(&conn, &token).unwrap().is_none());
}

#[test]
fn test_expired_sessions_are_invisible_and_purged() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "expired@example.com", Plan::Free);

    let expired = queries::create_session(&conn, user.id, -1).unwrap();
    let live = queries::create_session(&conn, user.id, 30).unwrap();

    assert!(queries::get_user_by_session(&conn, &expired).unwrap().is_none());
    assert_eq!(queries::purge_expired_sessions(&conn).unwrap(), 1);
    assert!(queries::get_user_by_session(&conn, &live).unwrap().is_some());
}

#[test]
fn test_delete_user_sessions_signs_out_everywhere() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "many@example.com", Plan::Free);
    let a = queries::create_session(&conn, user.id, 30).unwrap();
    let b = queries::create_session(&conn, user.id, 30).unwrap();

    assert_eq!(queries::delete_user_sessions(&conn, user.id).unwrap(), 2);
    assert!(queries::get_user_by_session(&conn, &a).unwrap().is_none());
    assert!(queries::get_user_by_session(&conn, &b).unwrap().is_none());
}

#[test]
fn test_marking_paid_unblocks_account() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "blocked@example.com", Plan::Pro);
    queries::set_user_status(&conn, user.id, AccountStatus::Blocked).unwrap();

    queries::set_user_payment_status(&conn, user.id, PaymentStatus::Paid, Some(date("2024-06-01")))
        .unwrap();

    let user = queries::get_user_by_id(&conn, user.id).unwrap().unwrap();
    assert_eq!(user.status, AccountStatus::Active);
    assert_eq!(user.payment_status, PaymentStatus::Paid);
    assert_eq!(user.due_date, Some(date("2024-06-01")));
}

#[test]
fn test_mark_overdue_tenants_only_touches_lapsed_paid_plans() {
    let conn = setup_test_db();
    let lapsed = create_test_user(&conn, "lapsed@example.com", Plan::Pro);
    let current = create_test_user(&conn, "current@example.com", Plan::Pro);
    let free = create_test_user(&conn, "free@example.com", Plan::Free);
    let admin = create_test_admin(&conn, "admin@example.com");

    for (id, plan) in [(lapsed.id, Plan::Pro), (free.id, Plan::Free), (admin.id, Plan::Pro)] {
        queries::set_user_plan(&conn, id, plan).unwrap();
        queries::set_user_payment_status(&conn, id, PaymentStatus::Pending, Some(date("2024-05-01")))
            .unwrap();
    }
    queries::set_user_payment_status(&conn, current.id, PaymentStatus::Pending, Some(date("2024-06-01")))
        .unwrap();
    let expired = create_test_user(&conn, "expired@example.com", Plan::Premium);
    queries::set_user_payment_status(&conn, expired.id, PaymentStatus::Paid, Some(date("2024-05-09")))
        .unwrap();
    let covered = create_test_user(&conn, "covered@example.com", Plan::Premium);
    queries::set_user_payment_status(&conn, covered.id, PaymentStatus::Paid, Some(date("2024-05-10")))
        .unwrap();

    let marked = queries::mark_overdue_tenants(&conn, date("2024-05-10")).unwrap();
    assert_eq!(marked, 2);

    let status = |id| queries::get_user_by_id(&conn, id).unwrap().unwrap().payment_status;
    assert_eq!(status(lapsed.id), PaymentStatus::Overdue);
    assert_eq!(status(expired.id), PaymentStatus::Overdue, "a paid period ends at its due date");
    assert_eq!(status(covered.id), PaymentStatus::Paid);
    assert_eq!(status(current.id), PaymentStatus::Pending);
    assert_eq!(status(free.id), PaymentStatus::Pending);
    assert_eq!(status(admin.id), PaymentStatus::Pending);
}

#[test]
fn test_legacy_smtp_passwords_are_encrypted() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "smtp@example.com", Plan::Pro);
    conn.execute(
        "UPDATE users SET smtp_user = 'me@gmail.com', smtp_pass = 'app-password' WHERE id = ?1",
        [user.id],
    )
    .unwrap();

    let key = test_master_key();
    assert_eq!(queries::encrypt_legacy_smtp_passwords(&conn, &key).unwrap(), 1);
    assert_eq!(
        queries::encrypt_legacy_smtp_passwords(&conn, &key).unwrap(),
        0,
        "already encrypted rows are left alone"
    );

    let user = queries::get_user_by_id(&conn, user.id).unwrap().unwrap();
    let encrypted = user.smtp_pass_encrypted.expect("password should be stored");
    assert_eq!(key.decrypt_string(user.id, &encrypted).unwrap(), "app-password");
}

#[test]
fn test_seed_demo_users_runs_once() {
    let conn = setup_test_db();
    let hash = hash_password(TEST_PASSWORD).unwrap();

    let created = queries::seed_demo_users(&conn, &hash, date("2024-01-01")).unwrap();
    assert!(created > 0);
    assert_eq!(queries::seed_demo_users(&conn, &hash, date("2024-01-01")).unwrap(), 0);

    let blocked = queries::get_user_by_email(&conn, "blocked1@test.com").unwrap().unwrap();
    assert!(blocked.is_blocked());
}
