//! Outgoing email over SMTP.
//!
//! Tenants may configure their own SMTP account; otherwise the system account
//! from the environment is used. With neither, nothing is sent and callers get
//! `EmailSendResult::NoCredentials`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lettre::message::{Mailbox, MultiPart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::crypto::MasterKey;
use crate::error::{AppError, Result};
use crate::models::User;

/// Retry delays in seconds for transient SMTP failures.
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// Neither the tenant nor the system has SMTP credentials
    NoCredentials,
}

#[derive(Clone)]
pub struct SmtpCredentials {
    pub user: String,
    pub pass: String,
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("user", &self.user)
            .field("pass", &"[REDACTED]")
            .finish()
    }
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[derive(Clone)]
enum Delivery {
    Smtp,
    /// Keep messages in memory instead of sending them.
    Outbox(Arc<Mutex<Vec<OutgoingEmail>>>),
}

#[derive(Clone)]
pub struct EmailService {
    host: String,
    port: u16,
    from_name: String,
    system: Option<SmtpCredentials>,
    delivery: Delivery,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Self {
        let system = match (&config.user, &config.pass) {
            (Some(user), Some(pass)) => Some(SmtpCredentials {
                user: user.clone(),
                pass: pass.clone(),
            }),
            _ => None,
        };
        Self {
            host: config.host.clone(),
            port: config.port,
            from_name: config.from_name.clone(),
            system,
            delivery: Delivery::Smtp,
        }
    }

    /// Service that records messages instead of sending them. The returned
    /// handle sees every message "sent".
    pub fn outbox(system_user: Option<&str>) -> (Self, Arc<Mutex<Vec<OutgoingEmail>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let service = Self {
            host: "localhost".into(),
            port: 25,
            from_name: "Meus Clientes".into(),
            system: system_user.map(|user| SmtpCredentials {
                user: user.to_string(),
                pass: "outbox".into(),
            }),
            delivery: Delivery::Outbox(sent.clone()),
        };
        (service, sent)
    }

    pub fn system_configured(&self) -> bool {
        self.system.is_some()
    }

    /// Tenant SMTP override if complete and decryptable, else the system account.
    pub fn credentials_for(&self, user: Option<&User>, master_key: &MasterKey) -> Option<SmtpCredentials> {
        if let Some(user) = user {
            if let (Some(smtp_user), Some(encrypted)) = (&user.smtp_user, &user.smtp_pass_encrypted) {
                match master_key.decrypt_string(user.id, encrypted) {
                    Ok(pass) => {
                        return Some(SmtpCredentials {
                            user: smtp_user.clone(),
                            pass,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(user_id = user.id, "Could not decrypt tenant SMTP password: {}", e);
                    }
                }
            }
        }
        self.system.clone()
    }

    /// Send an HTML email (with optional plain-text alternative).
    pub async fn send(
        &self,
        credentials: Option<SmtpCredentials>,
        to: &str,
        subject: &str,
        html: String,
        text: Option<String>,
    ) -> Result<EmailSendResult> {
        let Some(credentials) = credentials else {
            tracing::warn!(to = %to, "No SMTP credentials available, email not sent");
            return Ok(EmailSendResult::NoCredentials);
        };

        let email = OutgoingEmail {
            from: format!("\"{}\" <{}>", self.from_name, credentials.user),
            to: to.trim().to_string(),
            subject: subject.to_string(),
            html,
            text,
        };

        match &self.delivery {
            Delivery::Outbox(sent) => {
                tracing::debug!(to = %email.to, subject = %email.subject, "Email stored in outbox");
                if let Ok(mut sent) = sent.lock() {
                    sent.push(email);
                }
                Ok(EmailSendResult::Sent)
            }
            Delivery::Smtp => self.send_with_retry(&credentials, email).await,
        }
    }

    fn build_message(&self, credentials: &SmtpCredentials, email: &OutgoingEmail) -> Result<Message> {
        let from: Mailbox = format!("{} <{}>", self.from_name, credentials.user)
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid sender address: {}", e)))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| AppError::BadRequest(crate::error::msg::INVALID_EMAIL_FORMAT.into()))?;

        let builder = Message::builder().from(from).to(to).subject(email.subject.clone());
        let message = match &email.text {
            Some(text) => builder.multipart(MultiPart::alternative_plain_html(
                text.clone(),
                email.html.clone(),
            )),
            None => builder.header(ContentType::TEXT_HTML).body(email.html.clone()),
        };
        message.map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn transport(&self, credentials: &SmtpCredentials) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        // 465 is implicit TLS, everything else negotiates STARTTLS
        let builder = if self.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
        }
        .map_err(|e| AppError::Internal(format!("SMTP setup failed: {}", e)))?;

        Ok(builder
            .port(self.port)
            .credentials(Credentials::new(credentials.user.clone(), credentials.pass.clone()))
            .timeout(Some(Duration::from_secs(30)))
            .build())
    }

    /// Retries transient SMTP failures (4xx replies, connection errors).
    async fn send_with_retry(
        &self,
        credentials: &SmtpCredentials,
        email: OutgoingEmail,
    ) -> Result<EmailSendResult> {
        let message = self.build_message(credentials, &email)?;
        let transport = self.transport(credentials)?;
        let mut last_error = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match transport.send(message.clone()).await {
                Ok(_) => {
                    tracing::info!(to = %email.to, subject = %email.subject, attempt, "Email sent");
                    return Ok(EmailSendResult::Sent);
                }
                Err(e) if e.is_permanent() => {
                    tracing::error!(to = %email.to, error = %e, "SMTP rejected email");
                    return Err(AppError::Upstream(format!("SMTP error: {}", e)));
                }
                Err(e) => {
                    tracing::warn!(to = %email.to, error = %e, "Transient SMTP failure");
                    last_error = Some(e);
                }
            }
        }

        tracing::error!(
            to = %email.to,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(AppError::Upstream(format!(
            "SMTP error: {}",
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "retries exhausted".into())
        )))
    }
}
