use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::invoice::blank_to_none;
use crate::error::{AppError, Result, msg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
}

/// A recurring charge that produces one invoice per month.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub product: Option<String>,
    #[serde(rename = "value", serialize_with = "super::money::serialize")]
    pub value_cents: i64,
    pub day_of_month: u32,
    pub status: SubscriptionStatus,
    /// "YYYY-MM" of the last month an invoice was generated
    pub last_generated_month: Option<String>,
}

/// "YYYY-MM" for a date.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

impl Subscription {
    /// Due date for the month containing `today`, clamping day 29-31 to the month's last day.
    pub fn due_date_in(&self, today: NaiveDate) -> Option<NaiveDate> {
        let last = days_in_month(today.year(), today.month());
        NaiveDate::from_ymd_opt(today.year(), today.month(), self.day_of_month.min(last))
    }

    /// Active, not yet generated this month, and the billing day has arrived.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Active
            && self.last_generated_month.as_deref() != Some(month_key(today).as_str())
            && self.due_date_in(today).is_some_and(|due| due <= today)
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionInput {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub product: Option<String>,
    #[serde(default, deserialize_with = "super::money::deserialize_opt")]
    pub value: Option<i64>,
    pub day_of_month: Option<u32>,
    pub status: Option<SubscriptionStatus>,
}

/// Validated subscription fields.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub product: Option<String>,
    pub value_cents: i64,
    pub day_of_month: u32,
    pub status: SubscriptionStatus,
}

impl SubscriptionInput {
    pub fn validate(self) -> Result<NewSubscription> {
        let name = self.name.trim().to_string();
        let (Some(value_cents), Some(day_of_month)) = (self.value, self.day_of_month) else {
            return Err(AppError::BadRequest(msg::SUBSCRIPTION_FIELDS_REQUIRED.into()));
        };
        if name.is_empty() || value_cents == 0 {
            return Err(AppError::BadRequest(msg::SUBSCRIPTION_FIELDS_REQUIRED.into()));
        }
        if !(1..=31).contains(&day_of_month) {
            return Err(AppError::BadRequest(msg::INVALID_DAY_OF_MONTH.into()));
        }
        Ok(NewSubscription {
            name,
            email: blank_to_none(self.email),
            phone: blank_to_none(self.phone),
            product: blank_to_none(self.product),
            value_cents,
            day_of_month,
            status: self.status.unwrap_or(SubscriptionStatus::Active),
        })
    }
}
