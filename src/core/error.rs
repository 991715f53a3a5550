use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
///
/// The first five variants are the enrollment taxonomy surfaced to operators;
/// the rest are infrastructure failures.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Entity absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Illegal transition, carries the state the entity is actually in
    #[error("Invalid state: cannot {attempted} {entity} '{id}' while it is {current}")]
    InvalidState {
        entity: String,
        id: String,
        current: String,
        attempted: String,
    },

    /// Idempotency short-circuit: the student already has a successful payment
    #[error("Already paid: student '{0}' has a confirmed payment")]
    AlreadyPaid(String),

    /// Precondition not met: the student has not paid yet
    #[error("Payment required: student '{0}' has no confirmed payment")]
    PaymentRequired(String),

    /// Transient gateway failure (timeout, connection, 5xx); safe to retry
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Gateway rejected the request (4xx or unparseable response)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Validation errors for request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or malformed request identity / webhook signature
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Deadlock or lock-wait timeout; the transaction was rolled back and may be re-run
    #[error("Storage busy: {0}")]
    StorageContention(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "code": status_code.as_u16(),
                "kind": self.kind(),
                "message": self.public_message(),
                "retryable": self.is_retryable(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState { .. } => StatusCode::CONFLICT,
            AppError::AlreadyPaid(_) => StatusCode::CONFLICT,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::StorageContention(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::Gateway(msg.into())
    }

    pub fn gateway_unavailable(msg: impl Into<String>) -> Self {
        AppError::GatewayUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn invalid_state(
        entity: impl Into<String>,
        id: impl Into<String>,
        current: impl std::fmt::Display,
        attempted: impl Into<String>,
    ) -> Self {
        AppError::InvalidState {
            entity: entity.into(),
            id: id.into(),
            current: current.to_string(),
            attempted: attempted.into(),
        }
    }

    /// Stable machine-readable error kind for API consumers
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState { .. } => "invalid_state",
            AppError::AlreadyPaid(_) => "already_paid",
            AppError::PaymentRequired(_) => "payment_required",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::Gateway(_) => "gateway_error",
            AppError::Validation(_) => "validation",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::RateLimitExceeded(_) => "rate_limited",
            AppError::StorageContention(_) => "storage_busy",
            AppError::Database(_) => "database",
            AppError::Configuration(_) => "configuration",
            AppError::Json(_) => "invalid_json",
            AppError::Internal(_) => "internal",
        }
    }

    /// Whether the caller may re-invoke the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::GatewayUnavailable(_)
                | AppError::RateLimitExceeded(_)
                | AppError::StorageContention(_)
        )
    }

    /// Message safe to return to clients; infrastructure details stay in logs
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::StorageContention(_) => "Storage busy, retry the request".to_string(),
            AppError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}
