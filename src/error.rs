use axum::{
    Json,
    extract::multipart::MultipartError,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// User-facing messages. The dashboard is pt-BR, so these are too.
pub mod msg {
    pub const INVALID_CREDENTIALS: &str = "Credenciais inválidas";
    pub const ACCOUNT_BLOCKED: &str = "Conta bloqueada. Contate o administrador.";
    pub const PLAN_OVERDUE: &str = "Plano vencido. Realize o pagamento para continuar.";
    pub const REGISTER_FIELDS_REQUIRED: &str = "Nome, email e senha são obrigatórios";
    pub const EMAIL_TAKEN: &str = "Email já cadastrado";
    pub const INVALID_EMAIL_FORMAT: &str = "E-mail inválido";
    pub const PASSWORD_TOO_SHORT: &str = "A senha deve ter pelo menos 6 caracteres";
    pub const NEW_PASSWORD_REQUIRED: &str = "Nova senha é obrigatória";
    pub const EMAIL_NOT_FOUND: &str = "E-mail não encontrado.";
    pub const SMTP_NOT_CONFIGURED: &str = "Servidor de e-mail não configurado.";
    pub const EMAIL_SEND_FAILED: &str = "Erro ao enviar e-mail. Verifique os logs.";

    pub const USER_NOT_FOUND: &str = "Usuário não encontrado";
    pub const CLIENT_NOT_FOUND: &str = "Cliente/Fatura não encontrada";
    pub const CLIENT_WITHOUT_EMAIL: &str = "Cliente sem e-mail cadastrado";
    pub const CLIENT_FIELDS_REQUIRED: &str = "Nome, vencimento e valor são obrigatórios";
    pub const FREE_PLAN_LIMIT: &str =
        "Limite de 5 clientes atingido para o plano Grátis. Atualize para Pro ou Premium!";
    pub const INVALID_VALUE: &str = "Valor inválido";
    pub const INVALID_DATE: &str = "Data inválida (use AAAA-MM-DD)";

    pub const SUBSCRIPTION_NOT_FOUND: &str = "Assinatura não encontrada";
    pub const SUBSCRIPTION_FIELDS_REQUIRED: &str = "Nome, valor e dia são obrigatórios";
    pub const INVALID_DAY_OF_MONTH: &str = "Dia de vencimento deve estar entre 1 e 31";

    pub const SHARE_NOT_FOUND: &str = "Fatura não encontrada";
    pub const TICKET_NOT_FOUND: &str = "Ticket not found";
    pub const TICKET_FIELDS_REQUIRED: &str = "Assunto e mensagem são obrigatórios";
    pub const MESSAGE_REQUIRED: &str = "Mensagem é obrigatória";
    pub const TICKET_STATUS_FORBIDDEN: &str = "Apenas administradores podem alterar este status";

    pub const NO_FILE_UPLOADED: &str = "No file uploaded";
    pub const INVALID_IMAGE: &str = "Apenas imagens (png, jpg, jpeg, gif, webp) são permitidas";
    pub const FILE_TOO_LARGE: &str = "Arquivo muito grande (máximo 2MB)";

    pub const PAID_PLAN_REQUIRED: &str = "Recurso disponível apenas nos planos Pro e Premium";
    pub const WHATSAPP_NOT_CONFIGURED: &str = "WhatsApp (Evolution API) não configurado";
    pub const PHONE_REQUIRED: &str = "Telefone é obrigatório";
    pub const AI_NOT_CONFIGURED: &str = "IA não configurada";

    pub const ADMIN_REQUIRED: &str = "Acesso restrito a administradores";
    pub const MASTER_ONLY_PROMOTE: &str =
        "Apenas o administrador master pode promover administradores";
    pub const MASTER_ROLE_LOCKED: &str = "O papel do administrador master não pode ser alterado";
    pub const INVALID_ROLE: &str = "Papel inválido";
    pub const INVALID_PLAN: &str = "Plano inválido";
    pub const INVALID_STATUS: &str = "Status inválido";
    pub const INVALID_PAYMENT_STATUS: &str = "Status de pagamento inválido";
    pub const UNKNOWN_JOB: &str = "Tarefa desconhecida";

    pub const PLAN_NOT_PURCHASABLE: &str = "Plano indisponível para compra";
    pub const PLAN_PRICE_NOT_SET: &str = "Preço do plano não configurado";
    pub const GATEWAY_NOT_CONFIGURED: &str = "Gateway de pagamento não configurado";
    pub const UNKNOWN_GATEWAY: &str = "Gateway de pagamento desconhecido";

    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Outbound email could not be sent; the message is shown to the user.
    #[error("Email error: {0}")]
    Email(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_overdue: Option<bool>,
}

impl From<StatusCode> for AppError {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::UNAUTHORIZED => AppError::Unauthorized,
            StatusCode::FORBIDDEN => AppError::Forbidden(msg::ADMIN_REQUIRED.into()),
            StatusCode::NOT_FOUND => AppError::NotFound("Resource not found".into()),
            _ => AppError::Internal(format!("Status: {}", code)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("JSON inválido: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(format!("Parâmetros inválidos: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(format!("Caminho inválido: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Upload inválido: {}", err.body_text()))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut is_overdue = None;
        let (status, error, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::PaymentRequired(msg) => {
                is_overdue = Some(true);
                (StatusCode::PAYMENT_REQUIRED, msg, None)
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            AppError::Email(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::Upstream(e) => {
                tracing::error!("Upstream error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Falha ao comunicar com o serviço externo".to_string(),
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "JSON inválido".to_string(), Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal()
            }
        };

        let body = ErrorResponse {
            error,
            details,
            is_overdue,
        };

        (status, Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, String, Option<String>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Erro interno do servidor".to_string(),
        None,
    )
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Turns `Ok(None)` lookups into a 404 with the given message.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &'static str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.into()))
    }
}

impl<T> OptionExt<T> for Result<Option<T>> {
    fn or_not_found(self, message: &'static str) -> Result<T> {
        self?.ok_or_else(|| AppError::NotFound(message.into()))
    }
}
