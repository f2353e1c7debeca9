use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Invoices a free-plan tenant may hold.
pub const FREE_PLAN_INVOICE_LIMIT: i64 = 5;

const MIN_PASSWORD_LEN: usize = 6;

/// Basic email sanity check: one @, non-empty local part, dotted domain, no spaces.
pub fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    };

    if local.is_empty()
        || local.contains(' ')
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(msg::PASSWORD_TOO_SHORT.into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Premium,
}

impl Plan {
    pub fn is_paid(self) -> bool {
        !matches!(self, Plan::Free)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
}

/// Tenant subscription billing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

/// How a tenant's clients are told to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    Whatsapp,
    Pix,
    Boleto,
    Link,
}

impl PaymentMethod {
    /// Unknown or missing methods fall back to WhatsApp.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().to_lowercase().parse().ok())
            .unwrap_or(PaymentMethod::Whatsapp)
    }
}

/// A tenant account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub whatsapp: Option<String>,
    pub cpf: Option<String>,
    pub plan: Plan,
    pub status: AccountStatus,
    pub role: Role,
    pub is_master: bool,
    /// Admin that created this account
    pub owner_id: Option<i64>,
    pub payment_method: PaymentMethod,
    pub payment_pix_key: Option<String>,
    pub payment_instructions: Option<String>,
    pub logo: Option<String>,
    pub smtp_user: Option<String>,
    #[serde(skip)]
    pub smtp_pass_encrypted: Option<Vec<u8>>,
    pub created_at: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
    pub due_date: Option<NaiveDate>,
    #[serde(skip)]
    pub asaas_customer_id: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_blocked(&self) -> bool {
        self.status == AccountStatus::Blocked
    }

    /// Paid-plan tenants past their due date without a confirmed payment.
    /// Free plans and admins are never overdue.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.plan.is_paid()
            && !self.is_admin()
            && self.payment_status != PaymentStatus::Paid
            && self.due_date.is_some_and(|due| due < today)
    }

    /// WhatsApp automation and AI messages are paid-plan features.
    pub fn has_paid_features(&self) -> bool {
        self.plan.is_paid() || self.is_admin()
    }

    pub fn smtp_configured(&self) -> bool {
        self.smtp_user.is_some() && self.smtp_pass_encrypted.is_some()
    }
}

/// Minimal user view returned on login.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub plan: Plan,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            plan: u.plan,
            role: u.role,
        }
    }
}

/// Row of the admin user listing.
#[derive(Debug, Serialize)]
pub struct UserWithClientCount {
    #[serde(flatten)]
    pub user: User,
    pub client_count: i64,
}

/// Fields for inserting a user. The password arrives already hashed.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub whatsapp: Option<&'a str>,
    pub cpf: Option<&'a str>,
    pub plan: Plan,
    pub role: Role,
    pub is_master: bool,
    pub owner_id: Option<i64>,
    pub created_at: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub whatsapp: Option<String>,
    pub cpf: Option<String>,
}

impl RegisterInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::BadRequest(msg::REGISTER_FIELDS_REQUIRED.into()));
        }
        validate_email_format(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordInput {
    #[serde(default)]
    pub email: String,
}

/// Admin console: create a tenant owned by the calling admin.
#[derive(Debug, Deserialize)]
pub struct AdminCreateUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub whatsapp: Option<String>,
    pub cpf: Option<String>,
    pub role: Option<Role>,
    pub plan: Option<Plan>,
}

impl AdminCreateUser {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::BadRequest(msg::REGISTER_FIELDS_REQUIRED.into()));
        }
        validate_email_format(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentPrefs {
    pub payment_method: Option<String>,
    pub payment_pix_key: Option<String>,
    pub payment_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSmtp {
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
}

/// What the dashboard needs to render payment preferences. Never includes the SMTP password.
#[derive(Debug, Serialize)]
pub struct PaymentPrefs {
    pub payment_method: PaymentMethod,
    pub payment_pix_key: Option<String>,
    pub payment_instructions: Option<String>,
    pub logo: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_configured: bool,
}

impl From<&User> for PaymentPrefs {
    fn from(u: &User) -> Self {
        Self {
            payment_method: u.payment_method,
            payment_pix_key: u.payment_pix_key.clone(),
            payment_instructions: u.payment_instructions.clone(),
            logo: u.logo.clone(),
            smtp_user: u.smtp_user.clone(),
            smtp_configured: u.smtp_configured(),
        }
    }
}
