use std::env;
use std::path::Path;

use crate::crypto::MasterKey;
use crate::payments::Gateway;

/// Outbound SMTP account used when a tenant has no credentials of its own.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from_name: String,
}

/// Evolution API (WhatsApp gateway) settings. All three must be present.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub api_url: String,
    pub api_key: String,
    pub instance: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub api_url: String,
    pub access_token: String,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AsaasConfig {
    pub api_url: String,
    pub api_key: String,
    pub webhook_token: Option<String>,
}

/// Scheduler cadence.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub subscription_interval_minutes: u64,
    /// Six-field cron expression (with seconds), evaluated in UTC.
    pub reminder_cron: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub public_dir: String,
    pub upload_dir: String,
    pub dev_mode: bool,
    pub master_key: MasterKey,
    pub session_ttl_days: i64,
    pub migration_backup_count: i32,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
    pub smtp: SmtpConfig,
    pub evolution: Option<EvolutionConfig>,
    pub gemini: Option<GeminiConfig>,
    pub default_gateway: Gateway,
    pub mercadopago: Option<MercadoPagoConfig>,
    pub asaas: Option<AsaasConfig>,
    pub jobs: JobsConfig,
    /// Requests per minute per IP on login/register/forgot-password. 0 disables.
    pub auth_rate_limit_rpm: u32,
}

/// Read an env var, treating blank values as unset.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_database_path() -> String {
    if Path::new("/app/data").is_dir() {
        "/app/data/clients.db".to_string()
    } else {
        "clients.db".to_string()
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("APP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or("PORT", 3000);

        let base_url = var("BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let master_key = match var("MASTER_KEY") {
            Some(encoded) => MasterKey::from_base64(&encoded).unwrap_or_else(|e| {
                eprintln!("FATAL: MASTER_KEY is invalid: {}", e);
                std::process::exit(1);
            }),
            None if dev_mode => {
                tracing::warn!(
                    "MASTER_KEY not set, using an ephemeral key. Stored SMTP passwords will not survive a restart."
                );
                MasterKey::ephemeral()
            }
            None => {
                eprintln!("FATAL: MASTER_KEY is required outside dev mode.");
                eprintln!("Generate one with: meus-clientes --generate-master-key");
                std::process::exit(1);
            }
        };

        let evolution = match (
            var("EVOLUTION_API_URL"),
            var("EVOLUTION_API_KEY"),
            var("EVOLUTION_INSTANCE"),
        ) {
            (Some(api_url), Some(api_key), Some(instance)) => Some(EvolutionConfig {
                api_url: api_url.trim_end_matches('/').to_string(),
                api_key,
                instance,
            }),
            _ => None,
        };

        let gemini = var("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_url: var("GEMINI_API_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
        });

        let mercadopago = var("MERCADOPAGO_ACCESS_TOKEN").map(|access_token| MercadoPagoConfig {
            api_url: var("MERCADOPAGO_API_URL")
                .unwrap_or_else(|| "https://api.mercadopago.com".to_string()),
            access_token,
            webhook_secret: var("MERCADOPAGO_WEBHOOK_SECRET"),
        });

        let asaas = var("ASAAS_API_KEY").map(|api_key| AsaasConfig {
            api_url: var("ASAAS_API_URL").unwrap_or_else(|| "https://api.asaas.com".to_string()),
            api_key,
            webhook_token: var("ASAAS_WEBHOOK_TOKEN"),
        });

        let default_gateway = var("PAYMENT_GATEWAY")
            .and_then(|g| g.parse().ok())
            .unwrap_or(Gateway::MercadoPago);

        Self {
            host,
            port,
            database_path: var("DATABASE_PATH").unwrap_or_else(default_database_path),
            base_url,
            public_dir: var("PUBLIC_DIR").unwrap_or_else(|| "public".to_string()),
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| "public/uploads".to_string()),
            dev_mode,
            master_key,
            session_ttl_days: parse_or("SESSION_TTL_DAYS", 30),
            migration_backup_count: parse_or("MIGRATION_BACKUP_COUNT", 3),
            bootstrap_admin_email: var("BOOTSTRAP_ADMIN_EMAIL"),
            bootstrap_admin_password: var("BOOTSTRAP_ADMIN_PASSWORD"),
            smtp: SmtpConfig {
                host: var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                port: parse_or("SMTP_PORT", 587),
                user: var("SMTP_USER"),
                pass: var("SMTP_PASS"),
                from_name: var("SMTP_FROM_NAME").unwrap_or_else(|| "Meus Clientes".to_string()),
            },
            evolution,
            gemini,
            default_gateway,
            mercadopago,
            asaas,
            jobs: JobsConfig {
                subscription_interval_minutes: parse_or("SUBSCRIPTION_INTERVAL_MINUTES", 60),
                reminder_cron: var("REMINDER_CRON").unwrap_or_else(|| "0 0 12 * * *".to_string()),
            },
            auth_rate_limit_rpm: parse_or("RATE_LIMIT_AUTH_RPM", 10),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
