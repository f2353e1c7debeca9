use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Invoice status. Stored with the dashboard's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
pub enum InvoiceStatus {
    Pendente,
    Pago,
}

/// Which reminder was last sent for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReminderKind {
    /// Two days before the due date
    Upcoming,
    DueToday,
    /// One day after the due date
    Overdue,
}

impl ReminderKind {
    /// Reminder due for an invoice on `today`, if any.
    pub fn for_dates(due_date: NaiveDate, today: NaiveDate) -> Option<Self> {
        match (due_date - today).num_days() {
            2 => Some(ReminderKind::Upcoming),
            0 => Some(ReminderKind::DueToday),
            -1 => Some(ReminderKind::Overdue),
            _ => None,
        }
    }
}

/// A billable item sent to one of a tenant's clients. The HTTP API calls these "clients".
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub product: Option<String>,
    pub due_date: NaiveDate,
    #[serde(rename = "value", serialize_with = "super::money::serialize")]
    pub value_cents: i64,
    pub status: InvoiceStatus,
    pub paid_at: Option<NaiveDate>,
    pub last_reminder_on: Option<NaiveDate>,
    pub last_reminder_kind: Option<ReminderKind>,
}

impl Invoice {
    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Pago
    }

    pub fn product_label(&self) -> &str {
        self.product.as_deref().unwrap_or("")
    }
}

/// Create or fully replace an invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceInput {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub product: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "super::money::deserialize_opt")]
    pub value: Option<i64>,
}

/// Validated invoice fields with blanks normalized to `None`.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub product: Option<String>,
    pub due_date: NaiveDate,
    pub value_cents: i64,
}

pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl InvoiceInput {
    pub fn validate(self) -> Result<NewInvoice> {
        let name = self.name.trim().to_string();
        let (Some(due_date), Some(value_cents)) = (self.due_date, self.value) else {
            return Err(AppError::BadRequest(msg::CLIENT_FIELDS_REQUIRED.into()));
        };
        if name.is_empty() {
            return Err(AppError::BadRequest(msg::CLIENT_FIELDS_REQUIRED.into()));
        }
        let email = blank_to_none(self.email);
        if let Some(ref e) = email {
            super::validate_email_format(e)?;
        }
        Ok(NewInvoice {
            name,
            email,
            phone: blank_to_none(self.phone),
            cpf: blank_to_none(self.cpf),
            product: blank_to_none(self.product),
            due_date,
            value_cents,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    /// "Todos", "Pendente" or "Pago"
    pub status: Option<String>,
    pub search: Option<String>,
}

impl InvoiceFilter {
    /// `None` means no status filter ("Todos", empty or missing).
    pub fn status(&self) -> Result<Option<InvoiceStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("Todos") => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| AppError::BadRequest(msg::INVALID_STATUS.into())),
        }
    }
}

/// Dashboard KPIs, all money in centavos.
#[derive(Debug, Default, Clone, Serialize)]
pub struct InvoiceStats {
    pub total: i64,
    pub pending_count: i64,
    #[serde(serialize_with = "super::money::serialize")]
    pub pending_value: i64,
    #[serde(serialize_with = "super::money::serialize")]
    pub overdue_value: i64,
    #[serde(serialize_with = "super::money::serialize")]
    pub total_received: i64,
    #[serde(serialize_with = "super::money::serialize")]
    pub month_received: i64,
    #[serde(serialize_with = "super::money::serialize")]
    pub month_projected: i64,
    #[serde(serialize_with = "super::money::serialize")]
    pub recurring: i64,
}
