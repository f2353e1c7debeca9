mod from_row;
pub mod migrations;
pub mod queries;
mod schema;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use std::path::PathBuf;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::ai::AiClient;
use crate::config::Config;
use crate::crypto::MasterKey;
use crate::email::EmailService;
use crate::payments::PaymentGateways;
use crate::whatsapp::WhatsAppClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared handler state: the pool plus the outbound integrations.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public URL used in share links and emails (no trailing slash)
    pub base_url: String,
    pub master_key: MasterKey,
    pub session_ttl_days: i64,
    /// Where uploaded logos are written; served under `/uploads`
    pub upload_dir: PathBuf,
    pub email: EmailService,
    pub whatsapp: Option<WhatsAppClient>,
    pub ai: Option<AiClient>,
    pub payments: PaymentGateways,
}

impl AppState {
    pub fn from_config(db: DbPool, config: &Config) -> Self {
        Self {
            db,
            base_url: config.base_url.clone(),
            master_key: config.master_key.clone(),
            session_ttl_days: config.session_ttl_days,
            upload_dir: PathBuf::from(&config.upload_dir),
            email: EmailService::new(&config.smtp),
            whatsapp: config.evolution.as_ref().map(WhatsAppClient::new),
            ai: config.gemini.as_ref().map(AiClient::new),
            payments: PaymentGateways::from_config(config),
        }
    }

    pub fn share_url(&self, id: &str) -> String {
        format!("{}/share/{}", self.base_url, id)
    }
}

/// File-backed pool. Every connection enables foreign keys and waits on locks.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    Pool::builder().max_size(10).build(manager)
}
