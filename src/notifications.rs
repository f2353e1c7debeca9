//! Tenant-to-client messages: invoice emails and the daily reminders.

use chrono::NaiveDate;

use crate::db::{AppState, queries};
use crate::email::EmailSendResult;
use crate::error::{AppError, Result, msg};
use crate::models::{CreateShare, Invoice, ReminderKind, User};
use crate::templates::{self, PaymentInfo};

pub const NEW_INVOICE_SUBJECT: &str = "Nova Fatura";
pub const RESEND_INVOICE_SUBJECT: &str = "Lembrete de Fatura";
pub const RECURRING_INVOICE_SUBJECT: &str = "Fatura Recorrente";

/// Email the invoice to its client using the tenant's SMTP account (or the system one).
pub async fn send_invoice_email(
    state: &AppState,
    tenant: &User,
    invoice: &Invoice,
    subject_prefix: &str,
) -> Result<EmailSendResult> {
    let to = invoice
        .email
        .as_deref()
        .ok_or_else(|| AppError::BadRequest(msg::CLIENT_WITHOUT_EMAIL.into()))?;

    let html = templates::invoice_email_html(invoice, &PaymentInfo::from_user(tenant));
    let subject = templates::invoice_email_subject(subject_prefix, invoice);
    let credentials = state.email.credentials_for(Some(tenant), &state.master_key);

    state.email.send(credentials, to, &subject, html, None).await
}

/// Fire-and-forget variant for request handlers. Invoices without an email are skipped.
pub fn spawn_invoice_email(state: AppState, tenant: User, invoice: Invoice, subject_prefix: &'static str) {
    if invoice.email.is_none() {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = send_invoice_email(&state, &tenant, &invoice, subject_prefix).await {
            tracing::warn!(invoice_id = invoice.id, "Invoice email failed: {}", e);
        }
    });
}

/// Which channels delivered a reminder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderDelivery {
    pub whatsapp: bool,
    pub email: bool,
}

impl ReminderDelivery {
    pub fn any(&self) -> bool {
        self.whatsapp || self.email
    }
}

/// Send one reminder over every channel available for this tenant and client.
/// Channel failures are logged and reported as not delivered.
pub async fn send_reminder(
    state: &AppState,
    tenant: &User,
    invoice: &Invoice,
    kind: ReminderKind,
    today: NaiveDate,
) -> ReminderDelivery {
    let mut delivery = ReminderDelivery::default();

    if let (Some(whatsapp), Some(phone)) = (&state.whatsapp, invoice.phone.as_deref()) {
        if tenant.has_paid_features() {
            let share_url = tenant.logo.as_deref().and_then(|logo| {
                preview_link(state, tenant, invoice, logo)
                    .inspect_err(|e| tracing::warn!(invoice_id = invoice.id, "Preview link failed: {}", e))
                    .ok()
            });
            let text = templates::reminder_message(
                invoice,
                tenant.payment_method,
                &PaymentInfo::from_user(tenant),
                today,
                share_url.as_deref(),
            );
            match whatsapp.send_text(phone, &text).await {
                Ok(()) => delivery.whatsapp = true,
                Err(e) => tracing::warn!(invoice_id = invoice.id, "WhatsApp reminder failed: {}", e),
            }
        }
    }

    if let Some(ref to) = invoice.email {
        let html = templates::reminder_email_html(invoice, &PaymentInfo::from_user(tenant), kind);
        let subject = templates::reminder_subject(kind, invoice);
        let credentials = state.email.credentials_for(Some(tenant), &state.master_key);
        match state.email.send(credentials, to, &subject, html, None).await {
            Ok(EmailSendResult::Sent) => delivery.email = true,
            Ok(EmailSendResult::NoCredentials) => {}
            Err(e) => tracing::warn!(invoice_id = invoice.id, "Email reminder failed: {}", e),
        }
    }

    delivery
}

/// Branded preview card for a reminder, linked from the WhatsApp text.
fn preview_link(state: &AppState, tenant: &User, invoice: &Invoice, logo: &str) -> Result<String> {
    let conn = state.db.get()?;
    let share = queries::upsert_invoice_share(
        &conn,
        tenant.id,
        invoice.id,
        &CreateShare {
            client_name: invoice.name.clone(),
            value: templates::format_brl(invoice.value_cents),
            due_date: templates::format_date_br(invoice.due_date),
            logo: Some(logo.to_string()),
        },
    )?;
    Ok(state.share_url(&share.id))
}
