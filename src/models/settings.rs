use serde::{Deserialize, Serialize};

use super::Plan;

pub const PRICE_FREE_KEY: &str = "price_free";
pub const PRICE_PRO_KEY: &str = "price_pro";
pub const PRICE_PREMIUM_KEY: &str = "price_premium";
pub const PIX_KEY: &str = "pix_key";

/// Monthly plan prices in reais.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanPrices {
    #[serde(default)]
    pub free: f64,
    #[serde(default)]
    pub pro: f64,
    #[serde(default)]
    pub premium: f64,
}

impl PlanPrices {
    pub fn for_plan(&self, plan: Plan) -> f64 {
        match plan {
            Plan::Free => self.free,
            Plan::Pro => self.pro,
            Plan::Premium => self.premium,
        }
    }
}

/// Platform-wide settings edited from the admin console.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub prices: PlanPrices,
    pub pix_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettings {
    pub prices: Option<PlanPrices>,
    pub pix_key: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct AdminStats {
    pub users_free: i64,
    pub users_pro: i64,
    pub users_premium: i64,
    pub users_blocked: i64,
    pub total_users: i64,
    pub total_clients: i64,
    pub prices: PlanPrices,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_key: Option<String>,
}
