//! Background work: the subscription generator on an interval, and the daily
//! reminder dispatch plus billing sweep on a cron schedule.
//!
//! Every job is idempotent for a given day, so a job that runs twice (restart,
//! manual trigger from the admin console) never duplicates invoices or reminders.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use strum::{AsRefStr, EnumString};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::JobsConfig;
use crate::db::{AppState, queries};
use crate::email::EmailSendResult;
use crate::error::Result;
use crate::models::{Invoice, ReminderKind, User};
use crate::notifications::{self, RECURRING_INVOICE_SUBJECT};
use crate::util::today;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum JobKind {
    Subscriptions,
    Reminders,
    Billing,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SubscriptionRunSummary {
    pub generated: usize,
    pub emailed: usize,
    pub email_failures: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReminderRunSummary {
    pub candidates: usize,
    pub reminded: usize,
    pub whatsapp_sent: usize,
    pub email_sent: usize,
    /// Candidates no channel could deliver; retried on the next run
    pub undelivered: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BillingSweepSummary {
    pub marked_overdue: usize,
    pub sessions_purged: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobSummary {
    Subscriptions(SubscriptionRunSummary),
    Reminders(ReminderRunSummary),
    Billing(BillingSweepSummary),
}

pub async fn run_job(state: &AppState, kind: JobKind, today: NaiveDate) -> Result<JobSummary> {
    Ok(match kind {
        JobKind::Subscriptions => {
            JobSummary::Subscriptions(run_subscription_generator(state, None, today).await?)
        }
        JobKind::Reminders => JobSummary::Reminders(run_reminders(state, today).await?),
        JobKind::Billing => JobSummary::Billing(run_billing_sweep(state, today)?),
    })
}

// ============ Subscriptions ============

/// Insert this month's invoice for every due subscription, for one tenant or all.
/// A subscription that fails is logged and skipped; the others still generate.
pub fn generate_due_invoices(
    conn: &mut Connection,
    today: NaiveDate,
    tenant: Option<i64>,
) -> Result<Vec<Invoice>> {
    let subscriptions = queries::list_pending_subscriptions(conn, tenant, today)?;
    let mut generated = Vec::new();

    for sub in &subscriptions {
        match queries::generate_subscription_invoice(conn, sub, today) {
            Ok(Some(invoice)) => {
                tracing::debug!(
                    subscription_id = sub.id,
                    invoice_id = invoice.id,
                    "Recurring invoice generated"
                );
                generated.push(invoice);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(subscription_id = sub.id, "Subscription generation failed: {}", e),
        }
    }

    Ok(generated)
}

/// Generate due invoices, then email the ones with an address.
pub async fn run_subscription_generator(
    state: &AppState,
    tenant: Option<i64>,
    today: NaiveDate,
) -> Result<SubscriptionRunSummary> {
    let (generated, tenants) = {
        let mut conn = state.db.get()?;
        let generated = generate_due_invoices(&mut conn, today, tenant)?;
        let tenants = load_tenants(&conn, generated.iter().map(|i| i.user_id))?;
        (generated, tenants)
    };

    let mut summary = SubscriptionRunSummary {
        generated: generated.len(),
        ..Default::default()
    };

    for invoice in generated.iter().filter(|i| i.email.is_some()) {
        let Some(owner) = tenants.get(&invoice.user_id) else {
            continue;
        };
        match notifications::send_invoice_email(state, owner, invoice, RECURRING_INVOICE_SUBJECT).await {
            Ok(EmailSendResult::Sent) => summary.emailed += 1,
            Ok(EmailSendResult::NoCredentials) => {}
            Err(e) => {
                summary.email_failures += 1;
                tracing::warn!(invoice_id = invoice.id, "Recurring invoice email failed: {}", e);
            }
        }
    }

    tracing::info!(
        generated = summary.generated,
        emailed = summary.emailed,
        "Subscription generator finished"
    );
    Ok(summary)
}

fn load_tenants(conn: &Connection, ids: impl Iterator<Item = i64>) -> Result<HashMap<i64, User>> {
    let mut tenants = HashMap::new();
    for id in ids {
        if tenants.contains_key(&id) {
            continue;
        }
        if let Some(user) = queries::get_user_by_id(conn, id)? {
            tenants.insert(id, user);
        }
    }
    Ok(tenants)
}

// ============ Reminders ============

/// Remind every pending invoice due in two days, due today or one day late.
/// An invoice already reminded today is skipped.
pub async fn run_reminders(state: &AppState, today: NaiveDate) -> Result<ReminderRunSummary> {
    let (candidates, tenants) = {
        let conn = state.db.get()?;
        let candidates = queries::list_reminder_candidates(&conn, today)?;
        let tenants = load_tenants(&conn, candidates.iter().map(|i| i.user_id))?;
        (candidates, tenants)
    };

    let mut summary = ReminderRunSummary {
        candidates: candidates.len(),
        ..Default::default()
    };

    for invoice in &candidates {
        let (Some(kind), Some(owner)) = (
            ReminderKind::for_dates(invoice.due_date, today),
            tenants.get(&invoice.user_id),
        ) else {
            continue;
        };

        let delivery = notifications::send_reminder(state, owner, invoice, kind, today).await;
        summary.whatsapp_sent += delivery.whatsapp as usize;
        summary.email_sent += delivery.email as usize;

        if delivery.any() {
            let conn = state.db.get()?;
            queries::record_reminder(&conn, invoice.id, today, kind)?;
            summary.reminded += 1;
        } else {
            summary.undelivered += 1;
            tracing::debug!(invoice_id = invoice.id, "No channel delivered the reminder");
        }
    }

    tracing::info!(
        candidates = summary.candidates,
        reminded = summary.reminded,
        undelivered = summary.undelivered,
        "Reminder dispatch finished"
    );
    Ok(summary)
}

// ============ Billing ============

pub fn run_billing_sweep(state: &AppState, today: NaiveDate) -> Result<BillingSweepSummary> {
    let conn = state.db.get()?;
    let summary = BillingSweepSummary {
        marked_overdue: queries::mark_overdue_tenants(&conn, today)?,
        sessions_purged: queries::purge_expired_sessions(&conn)?,
    };
    tracing::info!(
        marked_overdue = summary.marked_overdue,
        sessions_purged = summary.sessions_purged,
        "Billing sweep finished"
    );
    Ok(summary)
}

// ============ Scheduling ============

/// Run the generator once now, then every `subscription_interval_minutes`.
pub fn spawn_subscription_loop(state: AppState, interval_minutes: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_minutes.max(1) * 60);
        loop {
            if let Err(e) = run_subscription_generator(&state, None, today()).await {
                tracing::warn!("Subscription generator failed: {}", e);
            }
            tokio::time::sleep(interval).await;
        }
    });

    tracing::info!("Subscription generator started (every {} minutes)", interval_minutes.max(1));
}

/// Start the interval loop and the daily cron job. Keep the returned scheduler alive.
pub async fn start(state: AppState, config: &JobsConfig) -> std::result::Result<JobScheduler, JobSchedulerError> {
    spawn_subscription_loop(state.clone(), config.subscription_interval_minutes);

    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(Job::new_async(config.reminder_cron.as_str(), move |_uuid, _l| {
            let state = state.clone();
            Box::pin(async move {
                let today = today();
                if let Err(e) = run_billing_sweep(&state, today) {
                    tracing::warn!("Billing sweep failed: {}", e);
                }
                if let Err(e) = run_reminders(&state, today).await {
                    tracing::warn!("Reminder dispatch failed: {}", e);
                }
            })
        })?)
        .await?;
    tracing::info!("Scheduled: reminders and billing sweep ({})", config.reminder_cron);

    scheduler.start().await?;
    Ok(scheduler)
}
