//! Row mapping for the models, plus `query_one`/`query_all` helpers.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a text column into an enum, surfacing bad values as column type errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Dates are stored as `YYYY-MM-DD`; rows written by older builds may carry a time suffix.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn get_date(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(col)?;
    parse_date(&text).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Blank or unparseable dates read as `None`.
fn get_date_opt(row: &Row, col: usize) -> rusqlite::Result<Option<NaiveDate>> {
    Ok(row.get::<_, Option<String>>(col)?.as_deref().and_then(parse_date))
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, name, email, whatsapp, cpf, plan, status, role, is_master, owner_id, payment_method, payment_pix_key, payment_instructions, logo, smtp_user, smtp_pass, created_at, payment_status, due_date, asaas_customer_id";

/// `USER_COLS` followed by the number of invoices the user holds.
pub const USER_WITH_CLIENT_COUNT_COLS: &str = "id, name, email, whatsapp, cpf, plan, status, role, is_master, owner_id, payment_method, payment_pix_key, payment_instructions, logo, smtp_user, smtp_pass, created_at, payment_status, due_date, asaas_customer_id, (SELECT COUNT(*) FROM clients c WHERE c.user_id = users.id)";

pub const INVOICE_COLS: &str = "id, user_id, name, email, phone, cpf, product, due_date, value_cents, status, paid_at, last_reminder_on, last_reminder_kind";

pub const SUBSCRIPTION_COLS: &str =
    "id, user_id, name, email, phone, product, value_cents, day_of_month, status, last_generated_month";

pub const SHARE_COLS: &str = "id, user_id, client_name, value, due_date, logo, created_at";

/// Requires `tickets t LEFT JOIN users u ON u.id = t.user_id`.
pub const TICKET_COLS: &str =
    "t.id, t.user_id, COALESCE(u.name, ''), t.subject, t.status, t.created_at, t.updated_at";

/// Requires `ticket_messages m LEFT JOIN users u ON u.id = m.user_id`.
pub const TICKET_MESSAGE_COLS: &str =
    "m.id, m.ticket_id, m.user_id, COALESCE(u.name, ''), m.message, m.created_at";

pub const PLAN_PAYMENT_COLS: &str = "id, user_id, plan, amount_cents, gateway, gateway_payment_id, status, pix_code, pix_qr_base64, created_at, paid_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let payment_method: Option<String> = row.get(10)?;
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            whatsapp: row.get(3)?,
            cpf: row.get(4)?,
            plan: parse_enum(row, 5, "plan")?,
            status: parse_enum(row, 6, "status")?,
            role: parse_enum(row, 7, "role")?,
            is_master: row.get(8)?,
            owner_id: row.get(9)?,
            payment_method: PaymentMethod::parse_or_default(payment_method.as_deref()),
            payment_pix_key: row.get(11)?,
            payment_instructions: row.get(12)?,
            logo: row.get(13)?,
            smtp_user: row.get(14)?,
            smtp_pass_encrypted: row.get(15)?,
            created_at: get_date_opt(row, 16)?,
            payment_status: parse_enum(row, 17, "payment_status")?,
            due_date: get_date_opt(row, 18)?,
            asaas_customer_id: row.get(19)?,
        })
    }
}

impl FromRow for UserWithClientCount {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserWithClientCount {
            user: User::from_row(row)?,
            client_count: row.get(20)?,
        })
    }
}

impl FromRow for Invoice {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let last_kind: Option<String> = row.get(12)?;
        Ok(Invoice {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            cpf: row.get(5)?,
            product: row.get(6)?,
            due_date: get_date(row, 7, "due_date")?,
            value_cents: row.get(8)?,
            status: parse_enum(row, 9, "status")?,
            paid_at: get_date_opt(row, 10)?,
            last_reminder_on: get_date_opt(row, 11)?,
            last_reminder_kind: last_kind.and_then(|k| k.parse().ok()),
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            product: row.get(5)?,
            value_cents: row.get(6)?,
            day_of_month: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            last_generated_month: row.get(9)?,
        })
    }
}

impl FromRow for InvoiceShare {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(InvoiceShare {
            id: row.get(0)?,
            user_id: row.get(1)?,
            client_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            value: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            due_date: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            logo: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Ticket {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Ticket {
            id: row.get(0)?,
            user_id: row.get(1)?,
            user_name: row.get(2)?,
            subject: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for TicketMessage {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TicketMessage {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            user_id: row.get(2)?,
            sender_name: row.get(3)?,
            message: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for PlanPayment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PlanPayment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            amount_cents: row.get(3)?,
            gateway: parse_enum(row, 4, "gateway")?,
            gateway_payment_id: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            pix_code: row.get(7)?,
            pix_qr_base64: row.get(8)?,
            created_at: row.get(9)?,
            paid_at: row.get(10)?,
        })
    }
}
