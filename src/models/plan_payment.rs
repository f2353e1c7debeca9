use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::Plan;
use crate::payments::Gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlanPaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// A PIX charge for a tenant's plan, tracked from checkout to gateway confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPayment {
    pub id: String,
    pub user_id: i64,
    pub plan: Plan,
    #[serde(rename = "amount", serialize_with = "super::money::serialize")]
    pub amount_cents: i64,
    pub gateway: Gateway,
    pub gateway_payment_id: Option<String>,
    pub status: PlanPaymentStatus,
    pub pix_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_qr_base64: Option<String>,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: Plan,
    pub gateway: Option<Gateway>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub id: String,
    pub gateway: Gateway,
    pub plan: Plan,
    #[serde(serialize_with = "super::money::serialize")]
    pub amount: i64,
    pub pix_code: Option<String>,
    pub pix_qr_base64: Option<String>,
}
