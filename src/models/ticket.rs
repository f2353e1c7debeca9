use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Answered,
    Closed,
}

/// Support ticket opened by a tenant.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub subject: String,
    pub status: TicketStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketMessage {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub sender_name: String,
    pub message: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketWithMessages {
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicket {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

impl CreateTicket {
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() || self.message.trim().is_empty() {
            return Err(AppError::BadRequest(msg::TICKET_FIELDS_REQUIRED.into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyTicket {
    #[serde(default)]
    pub message: String,
    pub status: Option<TicketStatus>,
}

impl ReplyTicket {
    /// Tenants may only close their own tickets; admins may set any status.
    pub fn validate(&self, is_admin: bool) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(AppError::BadRequest(msg::MESSAGE_REQUIRED.into()));
        }
        if !is_admin && matches!(self.status, Some(s) if s != TicketStatus::Closed) {
            return Err(AppError::Forbidden(msg::TICKET_STATUS_FORBIDDEN.into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}
