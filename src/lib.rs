//! Meus Clientes - invoicing and payment reminders for small businesses
//!
//! Tenants keep their clients' invoices and recurring subscriptions here; the
//! service reminds the clients by email and WhatsApp, publishes shareable
//! invoice previews, and sells the paid plans through PIX gateways.

pub mod ai;
pub mod config;
pub mod crypto;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod http;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod rate_limit;
pub mod templates;
pub mod util;
pub mod whatsapp;
