mod asaas;
mod mercadopago;

pub use asaas::*;
pub use mercadopago::*;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::config::Config;
use crate::error::{AppError, Result, msg};

/// PIX payment gateway used for plan purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Gateway {
    MercadoPago,
    Asaas,
}

/// A PIX charge created at a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixCharge {
    pub gateway_payment_id: String,
    /// PIX copy-and-paste code
    pub pix_code: Option<String>,
    pub pix_qr_base64: Option<String>,
}

/// Who is paying, as the gateways need it.
#[derive(Debug, Clone)]
pub struct Payer<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub cpf: Option<&'a str>,
}

/// The configured gateways. Either may be absent.
#[derive(Debug, Clone)]
pub struct PaymentGateways {
    pub default: Gateway,
    pub mercadopago: Option<MercadoPagoClient>,
    pub asaas: Option<AsaasClient>,
}

impl PaymentGateways {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default: config.default_gateway,
            mercadopago: config.mercadopago.as_ref().map(MercadoPagoClient::new),
            asaas: config.asaas.as_ref().map(AsaasClient::new),
        }
    }

    pub fn none() -> Self {
        Self {
            default: Gateway::MercadoPago,
            mercadopago: None,
            asaas: None,
        }
    }

    /// The requested gateway, or the default, provided it is configured.
    pub fn resolve(&self, requested: Option<Gateway>) -> Result<Gateway> {
        let gateway = requested.unwrap_or(self.default);
        let configured = match gateway {
            Gateway::MercadoPago => self.mercadopago.is_some(),
            Gateway::Asaas => self.asaas.is_some(),
        };
        if configured {
            Ok(gateway)
        } else {
            Err(AppError::Unavailable(msg::GATEWAY_NOT_CONFIGURED.into()))
        }
    }

    pub fn mercadopago(&self) -> Result<&MercadoPagoClient> {
        self.mercadopago
            .as_ref()
            .ok_or_else(|| AppError::Unavailable(msg::GATEWAY_NOT_CONFIGURED.into()))
    }

    pub fn asaas(&self) -> Result<&AsaasClient> {
        self.asaas
            .as_ref()
            .ok_or_else(|| AppError::Unavailable(msg::GATEWAY_NOT_CONFIGURED.into()))
    }
}
