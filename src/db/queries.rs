use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, types::Value};
use uuid::Uuid;

use crate::crypto::{MasterKey, generate_session_token, hash_secret, random_hex};
use crate::error::{AppError, Result, msg};
use crate::models::*;
use crate::payments::Gateway;

use super::from_row::{
    INVOICE_COLS, PLAN_PAYMENT_COLS, SHARE_COLS, SUBSCRIPTION_COLS, TICKET_COLS,
    TICKET_MESSAGE_COLS, USER_COLS, USER_WITH_CLIENT_COUNT_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Builder for dynamic UPDATE statements, optionally scoped to a tenant.
struct UpdateBuilder {
    table: &'static str,
    id: i64,
    owner: Option<i64>,
    fields: Vec<(&'static str, Value)>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: i64) -> Self {
        Self {
            table,
            id,
            owner: None,
            fields: Vec::new(),
        }
    }

    /// Only match rows owned by `user_id`.
    fn owned_by(mut self, user_id: i64) -> Self {
        self.owner = Some(user_id);
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// `None` writes NULL.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        let value = value.map(Into::into).unwrap_or(Value::Null);
        self.fields.push((column, value));
        self
    }

    /// Number of rows changed.
    fn execute(self, conn: &Connection) -> Result<usize> {
        if self.fields.is_empty() {
            return Ok(0);
        }
        let sets: Vec<String> = self.fields.iter().map(|(col, _)| format!("{col} = ?")).collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let mut sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        if let Some(owner) = self.owner {
            sql.push_str(" AND user_id = ?");
            values.push(owner.into());
        }
        Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?)
    }
}

fn date_value(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &NewUser) -> Result<User> {
    let email = input.email.trim().to_lowercase();
    let inserted = conn.execute(
        "INSERT INTO users (name, email, password_hash, whatsapp, cpf, plan, status, role,
            is_master, owner_id, created_at, payment_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8, ?9, ?10, 'pending')",
        params![
            input.name.trim(),
            &email,
            input.password_hash,
            input.whatsapp,
            input.cpf,
            input.plan.as_ref(),
            input.role.as_ref(),
            input.is_master,
            input.owner_id,
            input.created_at,
        ],
    );
    match inserted {
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::BadRequest(msg::EMAIL_TAKEN.into()));
        }
        other => {
            other?;
        }
    }
    get_user_by_id(conn, conn.last_insert_rowid())?
        .ok_or_else(|| AppError::Internal("user vanished after insert".into()))
}

pub fn get_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    query_one(conn, &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"), &[&id])
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim();
    query_one(conn, &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"), &[&email])
}

/// The user and their password hash, for login.
pub fn get_user_credentials(conn: &Connection, email: &str) -> Result<Option<(User, String)>> {
    let Some(user) = get_user_by_email(conn, email)? else {
        return Ok(None);
    };
    let hash: String = conn.query_row(
        "SELECT password_hash FROM users WHERE id = ?1",
        [user.id],
        |row| row.get(0),
    )?;
    Ok(Some((user, hash)))
}

pub fn set_password_hash(conn: &Connection, user_id: i64, password_hash: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, user_id],
    )?;
    Ok(changed > 0)
}

pub fn count_users(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn has_admin(conn: &Connection) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE role = 'admin'",
        [],
        |row| row.get(0),
    )?)
}

/// Users an admin may manage: everyone for the master, otherwise the admin
/// themself plus the accounts they created.
pub fn list_users_for_admin(conn: &Connection, admin: &User) -> Result<Vec<UserWithClientCount>> {
    if admin.is_master {
        query_all(
            conn,
            &format!("SELECT {USER_WITH_CLIENT_COUNT_COLS} FROM users ORDER BY id"),
            &[],
        )
    } else {
        query_all(
            conn,
            &format!(
                "SELECT {USER_WITH_CLIENT_COUNT_COLS} FROM users
                 WHERE id = ?1 OR owner_id = ?1 ORDER BY id"
            ),
            &[&admin.id],
        )
    }
}

/// Fetch `target_id` only if `admin` may manage it.
pub fn get_user_visible_to(conn: &Connection, admin: &User, target_id: i64) -> Result<Option<User>> {
    if admin.is_master {
        return get_user_by_id(conn, target_id);
    }
    query_one(
        conn,
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1 AND (id = ?2 OR owner_id = ?2)"),
        &[&target_id, &admin.id],
    )
}

pub fn set_user_role(conn: &Connection, user_id: i64, role: Role) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set("role", role.as_ref().to_string())
        .execute(conn)
}

pub fn set_user_plan(conn: &Connection, user_id: i64, plan: Plan) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set("plan", plan.as_ref().to_string())
        .execute(conn)
}

pub fn set_user_status(conn: &Connection, user_id: i64, status: AccountStatus) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set("status", status.as_ref().to_string())
        .execute(conn)
}

/// Marking a tenant as paid also unblocks the account.
pub fn set_user_payment_status(
    conn: &Connection,
    user_id: i64,
    status: PaymentStatus,
    due_date: Option<NaiveDate>,
) -> Result<usize> {
    let mut update = UpdateBuilder::new("users", user_id)
        .set("payment_status", status.as_ref().to_string())
        .set_opt("due_date", due_date.map(date_value));
    if status == PaymentStatus::Paid {
        update = update.set("status", AccountStatus::Active.as_ref().to_string());
    }
    update.execute(conn)
}

pub fn update_payment_prefs(
    conn: &Connection,
    user_id: i64,
    method: PaymentMethod,
    pix_key: Option<String>,
    instructions: Option<String>,
) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set("payment_method", method.as_ref().to_string())
        .set_nullable("payment_pix_key", pix_key)
        .set_nullable("payment_instructions", instructions)
        .execute(conn)
}

/// `None` for both clears the tenant's SMTP override.
pub fn update_smtp(
    conn: &Connection,
    user_id: i64,
    smtp_user: Option<String>,
    smtp_pass_encrypted: Option<Vec<u8>>,
) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set_nullable("smtp_user", smtp_user)
        .set_nullable("smtp_pass", smtp_pass_encrypted)
        .execute(conn)
}

pub fn update_logo(conn: &Connection, user_id: i64, logo: &str) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set("logo", logo.to_string())
        .execute(conn)
}

pub fn set_asaas_customer_id(conn: &Connection, user_id: i64, customer_id: &str) -> Result<usize> {
    UpdateBuilder::new("users", user_id)
        .set("asaas_customer_id", customer_id.to_string())
        .execute(conn)
}

/// Encrypt SMTP passwords left in plaintext by the legacy deployment. Returns how many were converted.
pub fn encrypt_legacy_smtp_passwords(conn: &Connection, master_key: &MasterKey) -> Result<usize> {
    let rows: Vec<(i64, String)> = {
        let mut stmt =
            conn.prepare("SELECT id, smtp_pass FROM users WHERE typeof(smtp_pass) = 'text'")?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?
    };

    for (id, plaintext) in &rows {
        let stored: Option<Vec<u8>> = if plaintext.is_empty() {
            None
        } else {
            Some(master_key.encrypt(*id, plaintext.as_bytes())?)
        };
        conn.execute(
            "UPDATE users SET smtp_pass = ?1 WHERE id = ?2",
            params![stored, id],
        )?;
    }
    Ok(rows.len())
}

/// Billing sweep: paid-plan tenants whose due date has passed become overdue.
/// A `paid` status only covers the period up to `due_date`, so it lapses too.
pub fn mark_overdue_tenants(conn: &Connection, today: NaiveDate) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE users SET payment_status = 'overdue'
         WHERE plan != 'free' AND role != 'admin'
           AND payment_status IN ('pending', 'paid')
           AND due_date IS NOT NULL AND due_date != '' AND due_date < ?1",
        [date_value(today)],
    )?)
}

/// Demo tenants for local development. Only runs on a database with at most one user.
pub fn seed_demo_users(conn: &Connection, password_hash: &str, today: NaiveDate) -> Result<usize> {
    if count_users(conn)? > 1 {
        return Ok(0);
    }
    let demo = [
        ("User 1", "user1@test.com", Plan::Free, AccountStatus::Active),
        ("User 2", "user2@test.com", Plan::Free, AccountStatus::Active),
        ("User 3", "user3@test.com", Plan::Free, AccountStatus::Active),
        ("User 4", "user4@test.com", Plan::Free, AccountStatus::Active),
        ("User 5", "user5@test.com", Plan::Free, AccountStatus::Active),
        ("Pro User 1", "pro1@test.com", Plan::Pro, AccountStatus::Active),
        ("Pro User 2", "pro2@test.com", Plan::Pro, AccountStatus::Active),
        ("Blocked User", "blocked1@test.com", Plan::Free, AccountStatus::Blocked),
    ];

    let mut created = 0;
    for (name, email, plan, status) in demo {
        let result = create_user(
            conn,
            &NewUser {
                name,
                email,
                password_hash,
                whatsapp: None,
                cpf: None,
                plan,
                role: Role::User,
                is_master: false,
                owner_id: None,
                created_at: today,
            },
        );
        match result {
            Ok(user) => {
                if status == AccountStatus::Blocked {
                    set_user_status(conn, user.id, status)?;
                }
                created += 1;
            }
            Err(AppError::BadRequest(_)) => {
                tracing::debug!("Skipping existing demo user {}", email);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

// ============ Sessions ============

/// Create a session and return the bearer token. Only its hash is stored.
pub fn create_session(conn: &Connection, user_id: i64, ttl_days: i64) -> Result<String> {
    let token = generate_session_token();
    let now = now();
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![hash_secret(&token), user_id, now, now + ttl_days * 86_400],
    )?;
    Ok(token)
}

pub fn get_user_by_session(conn: &Connection, token: &str) -> Result<Option<User>> {
    let cols = USER_COLS
        .split(", ")
        .map(|c| format!("u.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    query_one(
        conn,
        &format!(
            "SELECT {cols} FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?1 AND s.expires_at > ?2"
        ),
        &[&hash_secret(token), &now()],
    )
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [hash_secret(token)])?;
    Ok(deleted > 0)
}

/// Sign a user out everywhere (password reset, block).
pub fn delete_user_sessions(conn: &Connection, user_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?)
}

pub fn purge_expired_sessions(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now()])?)
}

// ============ Invoices ============

fn insert_invoice(conn: &Connection, user_id: i64, input: &NewInvoice) -> Result<i64> {
    conn.execute(
        "INSERT INTO clients (user_id, name, email, phone, cpf, product, due_date, value_cents, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'Pendente')",
        params![
            user_id,
            input.name,
            input.email,
            input.phone,
            input.cpf,
            input.product,
            input.due_date,
            input.value_cents,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a pending invoice. With `limit`, fails with 403 once the tenant already
/// holds that many invoices; the count and insert share one write transaction.
pub fn create_invoice(
    conn: &mut Connection,
    user_id: i64,
    limit: Option<i64>,
    input: &NewInvoice,
) -> Result<Invoice> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(limit) = limit {
        if count_invoices(&tx, user_id)? >= limit {
            return Err(AppError::Forbidden(msg::FREE_PLAN_LIMIT.into()));
        }
    }

    let id = insert_invoice(&tx, user_id, input)?;
    let invoice = get_invoice(&tx, user_id, id)?
        .ok_or_else(|| AppError::Internal("invoice vanished after insert".into()))?;
    tx.commit()?;
    Ok(invoice)
}

pub fn get_invoice(conn: &Connection, user_id: i64, id: i64) -> Result<Option<Invoice>> {
    query_one(
        conn,
        &format!("SELECT {INVOICE_COLS} FROM clients WHERE id = ?1 AND user_id = ?2"),
        &[&id, &user_id],
    )
}

pub fn count_invoices(conn: &Connection, user_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM clients WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?)
}

/// The tenant's invoices ordered by due date. Search matches name or email.
pub fn list_invoices(conn: &Connection, user_id: i64, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
    let mut sql = format!("SELECT {INVOICE_COLS} FROM clients WHERE user_id = ?");
    let mut values: Vec<Value> = vec![user_id.into()];

    if let Some(status) = filter.status()? {
        sql.push_str(" AND status = ?");
        values.push(status.as_ref().to_string().into());
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(" AND (name LIKE ? OR email LIKE ?)");
        let pattern = format!("%{search}%");
        values.push(pattern.clone().into());
        values.push(pattern.into());
    }
    sql.push_str(" ORDER BY due_date ASC, id ASC");

    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    query_all(conn, &sql, &params)
}

pub fn update_invoice(conn: &Connection, user_id: i64, id: i64, input: &NewInvoice) -> Result<usize> {
    UpdateBuilder::new("clients", id)
        .owned_by(user_id)
        .set("name", input.name.clone())
        .set_nullable("email", input.email.clone())
        .set_nullable("phone", input.phone.clone())
        .set_nullable("cpf", input.cpf.clone())
        .set_nullable("product", input.product.clone())
        .set("due_date", date_value(input.due_date))
        .set("value_cents", input.value_cents)
        .execute(conn)
}

pub fn mark_invoice_paid(conn: &Connection, user_id: i64, id: i64, today: NaiveDate) -> Result<usize> {
    UpdateBuilder::new("clients", id)
        .owned_by(user_id)
        .set("status", InvoiceStatus::Pago.as_ref().to_string())
        .set("paid_at", date_value(today))
        .execute(conn)
}

pub fn delete_invoice(conn: &Connection, user_id: i64, id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM clients WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?)
}

/// Pending invoices inside a reminder window (D-2, D0, D+1) not yet reminded today.
pub fn list_reminder_candidates(conn: &Connection, today: NaiveDate) -> Result<Vec<Invoice>> {
    let upcoming = date_value(today + Duration::days(2));
    let due_today = date_value(today);
    let overdue = date_value(today - Duration::days(1));
    query_all(
        conn,
        &format!(
            "SELECT {INVOICE_COLS} FROM clients
             WHERE status = 'Pendente'
               AND due_date IN (?1, ?2, ?3)
               AND (last_reminder_on IS NULL OR last_reminder_on != ?2)
             ORDER BY user_id, due_date"
        ),
        &[&upcoming, &due_today, &overdue],
    )
}

pub fn record_reminder(conn: &Connection, id: i64, today: NaiveDate, kind: ReminderKind) -> Result<usize> {
    UpdateBuilder::new("clients", id)
        .set("last_reminder_on", date_value(today))
        .set("last_reminder_kind", kind.as_ref().to_string())
        .execute(conn)
}

pub fn invoice_stats(conn: &Connection, user_id: i64, today: NaiveDate) -> Result<InvoiceStats> {
    let month = month_key(today);
    let mut stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'Pendente' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'Pendente' THEN value_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'Pendente' AND due_date < ?2 THEN value_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'Pago' THEN value_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'Pago' AND substr(paid_at, 1, 7) = ?3 THEN value_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN substr(due_date, 1, 7) = ?3 THEN value_cents ELSE 0 END), 0)
         FROM clients WHERE user_id = ?1",
        params![user_id, date_value(today), month],
        |row| {
            Ok(InvoiceStats {
                total: row.get(0)?,
                pending_count: row.get(1)?,
                pending_value: row.get(2)?,
                overdue_value: row.get(3)?,
                total_received: row.get(4)?,
                month_received: row.get(5)?,
                month_projected: row.get(6)?,
                recurring: 0,
            })
        },
    )?;
    stats.recurring = conn.query_row(
        "SELECT COALESCE(SUM(value_cents), 0) FROM subscriptions WHERE user_id = ?1 AND status = 'active'",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(stats)
}

// ============ Subscriptions ============

pub fn create_subscription(conn: &Connection, user_id: i64, input: &NewSubscription) -> Result<Subscription> {
    conn.execute(
        "INSERT INTO subscriptions (user_id, name, email, phone, product, value_cents, day_of_month, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user_id,
            input.name,
            input.email,
            input.phone,
            input.product,
            input.value_cents,
            input.day_of_month,
            input.status.as_ref(),
        ],
    )?;
    get_subscription(conn, user_id, conn.last_insert_rowid())?
        .ok_or_else(|| AppError::Internal("subscription vanished after insert".into()))
}

pub fn get_subscription(conn: &Connection, user_id: i64, id: i64) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!("SELECT {SUBSCRIPTION_COLS} FROM subscriptions WHERE id = ?1 AND user_id = ?2"),
        &[&id, &user_id],
    )
}

pub fn list_subscriptions(conn: &Connection, user_id: i64) -> Result<Vec<Subscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {SUBSCRIPTION_COLS} FROM subscriptions WHERE user_id = ?1
             ORDER BY day_of_month ASC, id ASC"
        ),
        &[&user_id],
    )
}

pub fn update_subscription(
    conn: &Connection,
    user_id: i64,
    id: i64,
    input: &NewSubscription,
) -> Result<usize> {
    UpdateBuilder::new("subscriptions", id)
        .owned_by(user_id)
        .set("name", input.name.clone())
        .set_nullable("email", input.email.clone())
        .set_nullable("phone", input.phone.clone())
        .set_nullable("product", input.product.clone())
        .set("value_cents", input.value_cents)
        .set("day_of_month", input.day_of_month as i64)
        .set("status", input.status.as_ref().to_string())
        .execute(conn)
}

pub fn delete_subscription(conn: &Connection, user_id: i64, id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?)
}

/// Active subscriptions not yet generated this month, for one tenant or all.
pub fn list_pending_subscriptions(
    conn: &Connection,
    tenant: Option<i64>,
    today: NaiveDate,
) -> Result<Vec<Subscription>> {
    let month = month_key(today);
    let subs: Vec<Subscription> = match tenant {
        Some(user_id) => query_all(
            conn,
            &format!(
                "SELECT {SUBSCRIPTION_COLS} FROM subscriptions
                 WHERE status = 'active' AND user_id = ?1
                   AND (last_generated_month IS NULL OR last_generated_month != ?2)
                 ORDER BY id"
            ),
            &[&user_id, &month],
        )?,
        None => query_all(
            conn,
            &format!(
                "SELECT {SUBSCRIPTION_COLS} FROM subscriptions
                 WHERE status = 'active'
                   AND (last_generated_month IS NULL OR last_generated_month != ?1)
                 ORDER BY id"
            ),
            &[&month],
        )?,
    };
    Ok(subs.into_iter().filter(|s| s.is_due(today)).collect())
}

/// Generate this month's invoice for a subscription. The month stamp is claimed
/// with a conditional UPDATE in the same transaction as the insert, so two
/// concurrent runs never produce duplicates. `None` when already generated.
pub fn generate_subscription_invoice(
    conn: &mut Connection,
    sub: &Subscription,
    today: NaiveDate,
) -> Result<Option<Invoice>> {
    let Some(due_date) = sub.due_date_in(today) else {
        return Ok(None);
    };
    let month = month_key(today);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let claimed = tx.execute(
        "UPDATE subscriptions SET last_generated_month = ?1
         WHERE id = ?2 AND status = 'active'
           AND (last_generated_month IS NULL OR last_generated_month != ?1)",
        params![month, sub.id],
    )?;
    if claimed == 0 {
        return Ok(None);
    }

    let id = insert_invoice(
        &tx,
        sub.user_id,
        &NewInvoice {
            name: sub.name.clone(),
            email: sub.email.clone(),
            phone: sub.phone.clone(),
            cpf: None,
            product: sub.product.clone(),
            due_date,
            value_cents: sub.value_cents,
        },
    )?;
    let invoice = get_invoice(&tx, sub.user_id, id)?;
    tx.commit()?;
    Ok(invoice)
}

// ============ Shares ============

/// Store a preview card under a fresh 8-hex-char id.
pub fn create_share(conn: &Connection, user_id: Option<i64>, input: &CreateShare) -> Result<InvoiceShare> {
    insert_share(conn, user_id, None, input)
}

/// The reminder card of an invoice. Reminders reuse one card per invoice,
/// refreshed with the invoice's current values.
pub fn upsert_invoice_share(
    conn: &Connection,
    user_id: i64,
    invoice_id: i64,
    input: &CreateShare,
) -> Result<InvoiceShare> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM invoice_shares WHERE invoice_id = ?1",
            [invoice_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(id) = existing else {
        return insert_share(conn, Some(user_id), Some(invoice_id), input);
    };
    let logo = input.logo.clone().filter(|l| !l.trim().is_empty());
    conn.execute(
        "UPDATE invoice_shares SET client_name = ?1, value = ?2, due_date = ?3, logo = ?4
         WHERE id = ?5",
        params![input.client_name, input.value, input.due_date, logo, id],
    )?;
    get_share(conn, &id)?.ok_or_else(|| AppError::Internal("invoice share vanished after update".into()))
}

fn insert_share(
    conn: &Connection,
    user_id: Option<i64>,
    invoice_id: Option<i64>,
    input: &CreateShare,
) -> Result<InvoiceShare> {
    let logo = input.logo.clone().filter(|l| !l.trim().is_empty());
    for _ in 0..5 {
        let id = random_hex(4);
        let created_at = now();
        let inserted = conn.execute(
            "INSERT INTO invoice_shares (id, user_id, client_name, value, due_date, logo, created_at, invoice_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![id, user_id, input.client_name, input.value, input.due_date, logo, created_at, invoice_id],
        );
        match inserted {
            Ok(_) => {
                return Ok(InvoiceShare {
                    id,
                    user_id,
                    client_name: input.client_name.clone(),
                    value: input.value.clone(),
                    due_date: input.due_date.clone(),
                    logo,
                    created_at,
                });
            }
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Internal("could not allocate a share id".into()))
}

pub fn get_share(conn: &Connection, id: &str) -> Result<Option<InvoiceShare>> {
    query_one(conn, &format!("SELECT {SHARE_COLS} FROM invoice_shares WHERE id = ?1"), &[&id])
}

// ============ Tickets ============

pub fn create_ticket(conn: &mut Connection, user_id: i64, subject: &str, message: &str) -> Result<i64> {
    let now = now();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO tickets (user_id, subject, status, created_at, updated_at)
         VALUES (?1, ?2, 'open', ?3, ?3)",
        params![user_id, subject.trim(), now],
    )?;
    let ticket_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO ticket_messages (ticket_id, user_id, message, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![ticket_id, user_id, message.trim(), now],
    )?;
    tx.commit()?;
    Ok(ticket_id)
}

/// Newest activity first. `user_id` restricts to one tenant's tickets.
pub fn list_tickets(conn: &Connection, user_id: Option<i64>) -> Result<Vec<Ticket>> {
    match user_id {
        Some(id) => query_all(
            conn,
            &format!(
                "SELECT {TICKET_COLS} FROM tickets t LEFT JOIN users u ON u.id = t.user_id
                 WHERE t.user_id = ?1 ORDER BY t.updated_at DESC, t.id DESC"
            ),
            &[&id],
        ),
        None => query_all(
            conn,
            &format!(
                "SELECT {TICKET_COLS} FROM tickets t LEFT JOIN users u ON u.id = t.user_id
                 ORDER BY t.updated_at DESC, t.id DESC"
            ),
            &[],
        ),
    }
}

pub fn get_ticket(conn: &Connection, id: i64) -> Result<Option<Ticket>> {
    query_one(
        conn,
        &format!("SELECT {TICKET_COLS} FROM tickets t LEFT JOIN users u ON u.id = t.user_id WHERE t.id = ?1"),
        &[&id],
    )
}

pub fn list_ticket_messages(conn: &Connection, ticket_id: i64) -> Result<Vec<TicketMessage>> {
    query_all(
        conn,
        &format!(
            "SELECT {TICKET_MESSAGE_COLS} FROM ticket_messages m LEFT JOIN users u ON u.id = m.user_id
             WHERE m.ticket_id = ?1 ORDER BY m.created_at ASC, m.id ASC"
        ),
        &[&ticket_id],
    )
}

/// Append a reply, bump `updated_at` and optionally change the status.
pub fn add_ticket_message(
    conn: &mut Connection,
    ticket_id: i64,
    user_id: i64,
    message: &str,
    status: Option<TicketStatus>,
) -> Result<i64> {
    let now = now();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO ticket_messages (ticket_id, user_id, message, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![ticket_id, user_id, message.trim(), now],
    )?;
    let message_id = tx.last_insert_rowid();
    UpdateBuilder::new("tickets", ticket_id)
        .set("updated_at", now)
        .set_opt("status", status.map(|s| s.as_ref().to_string()))
        .execute(&tx)?;
    tx.commit()?;
    Ok(message_id)
}

pub fn count_open_tickets(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM tickets WHERE status = 'open'",
        [],
        |row| row.get(0),
    )?)
}

// ============ Settings ============

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()?
        .flatten())
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn get_price(conn: &Connection, key: &str) -> Result<f64> {
    Ok(get_setting(conn, key)?
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0))
}

pub fn get_settings(conn: &Connection) -> Result<Settings> {
    Ok(Settings {
        prices: PlanPrices {
            free: get_price(conn, PRICE_FREE_KEY)?,
            pro: get_price(conn, PRICE_PRO_KEY)?,
            premium: get_price(conn, PRICE_PREMIUM_KEY)?,
        },
        pix_key: get_setting(conn, PIX_KEY)?.filter(|k| !k.is_empty()),
    })
}

pub fn update_settings(conn: &mut Connection, input: &UpdateSettings) -> Result<()> {
    let tx = conn.transaction()?;
    if let Some(prices) = input.prices {
        set_setting(&tx, PRICE_FREE_KEY, &prices.free.to_string())?;
        set_setting(&tx, PRICE_PRO_KEY, &prices.pro.to_string())?;
        set_setting(&tx, PRICE_PREMIUM_KEY, &prices.premium.to_string())?;
    }
    if let Some(ref pix_key) = input.pix_key {
        set_setting(&tx, PIX_KEY, pix_key.trim())?;
    }
    tx.commit()?;
    Ok(())
}

pub fn admin_stats(conn: &Connection) -> Result<AdminStats> {
    let mut stats = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN plan = 'free' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN plan = 'pro' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN plan = 'premium' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'blocked' THEN 1 ELSE 0 END), 0),
            COUNT(*)
         FROM users",
        [],
        |row| {
            Ok(AdminStats {
                users_free: row.get(0)?,
                users_pro: row.get(1)?,
                users_premium: row.get(2)?,
                users_blocked: row.get(3)?,
                total_users: row.get(4)?,
                ..Default::default()
            })
        },
    )?;
    stats.total_clients = conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
    let settings = get_settings(conn)?;
    stats.prices = settings.prices;
    stats.pix_key = settings.pix_key;
    Ok(stats)
}

// ============ Plan payments ============

pub fn create_plan_payment(
    conn: &Connection,
    user_id: i64,
    plan: Plan,
    amount_cents: i64,
    gateway: Gateway,
) -> Result<PlanPayment> {
    let id = Uuid::new_v4().to_string();
    let created_at = now();
    conn.execute(
        "INSERT INTO plan_payments (id, user_id, plan, amount_cents, gateway, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        params![id, user_id, plan.as_ref(), amount_cents, gateway.as_ref(), created_at],
    )?;
    Ok(PlanPayment {
        id,
        user_id,
        plan,
        amount_cents,
        gateway,
        gateway_payment_id: None,
        status: PlanPaymentStatus::Pending,
        pix_code: None,
        pix_qr_base64: None,
        created_at,
        paid_at: None,
    })
}

/// Record the gateway's charge id and PIX payload.
pub fn attach_gateway_charge(
    conn: &Connection,
    id: &str,
    gateway_payment_id: &str,
    pix_code: Option<&str>,
    pix_qr_base64: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE plan_payments SET gateway_payment_id = ?1, pix_code = ?2, pix_qr_base64 = ?3
         WHERE id = ?4",
        params![gateway_payment_id, pix_code, pix_qr_base64, id],
    )?;
    Ok(changed > 0)
}

pub fn mark_plan_payment_failed(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE plan_payments SET status = 'failed' WHERE id = ?1 AND status = 'pending'",
        [id],
    )?;
    Ok(changed > 0)
}

pub fn get_plan_payment(conn: &Connection, id: &str) -> Result<Option<PlanPayment>> {
    query_one(conn, &format!("SELECT {PLAN_PAYMENT_COLS} FROM plan_payments WHERE id = ?1"), &[&id])
}

pub fn get_plan_payment_by_gateway_id(
    conn: &Connection,
    gateway: Gateway,
    gateway_payment_id: &str,
) -> Result<Option<PlanPayment>> {
    query_one(
        conn,
        &format!(
            "SELECT {PLAN_PAYMENT_COLS} FROM plan_payments WHERE gateway = ?1 AND gateway_payment_id = ?2"
        ),
        &[&gateway.as_ref(), &gateway_payment_id],
    )
}

pub fn list_plan_payments(conn: &Connection, user_id: i64) -> Result<Vec<PlanPayment>> {
    query_all(
        conn,
        &format!(
            "SELECT {PLAN_PAYMENT_COLS} FROM plan_payments WHERE user_id = ?1
             ORDER BY created_at DESC, id"
        ),
        &[&user_id],
    )
}

/// Confirm a plan payment and extend the tenant's plan by 30 days from
/// `max(today, due_date)`. Returns `false` when the payment was already
/// processed (webhook replay), leaving everything untouched.
///
/// A `failed` payment can still be confirmed: the checkout may have errored
/// after the gateway created the charge, and the payer may settle it anyway.
pub fn confirm_plan_payment(conn: &mut Connection, id: &str, today: NaiveDate) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let claimed = tx.execute(
        "UPDATE plan_payments SET status = 'paid', paid_at = ?1
         WHERE id = ?2 AND status IN ('pending', 'failed')",
        params![now(), id],
    )?;
    if claimed == 0 {
        return Ok(false);
    }

    let payment = get_plan_payment(&tx, id)?
        .ok_or_else(|| AppError::Internal("plan payment vanished after claim".into()))?;
    let user = get_user_by_id(&tx, payment.user_id)?
        .ok_or_else(|| AppError::NotFound(msg::USER_NOT_FOUND.into()))?;

    let base = user.due_date.filter(|due| *due > today).unwrap_or(today);
    let next_due = base + Duration::days(30);

    UpdateBuilder::new("users", user.id)
        .set("plan", payment.plan.as_ref().to_string())
        .set("payment_status", PaymentStatus::Paid.as_ref().to_string())
        .set("status", AccountStatus::Active.as_ref().to_string())
        .set("due_date", date_value(next_due))
        .execute(&tx)?;

    tx.commit()?;
    tracing::info!(
        "Plan payment {} confirmed: user {} on {} until {}",
        id,
        user.id,
        payment.plan.as_ref(),
        next_due
    );
    Ok(true)
}
