use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => {
                ApiError::validation(format!("{}: {}", field, reason))
            }
            AppErr::Domain(DomainError::NameTaken(name)) => ApiError::new(
                StatusCode::CONFLICT,
                "NAME_TAKEN",
                format!("name already in use: {}", name),
            ),
            AppErr::Domain(DomainError::ParticipantNotFound(name)) => ApiError::new(
                StatusCode::NOT_FOUND,
                "PARTICIPANT_NOT_FOUND",
                format!("participant not found: {}", name),
            ),
            AppErr::Domain(DomainError::SenderNotRegistered(name)) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "SENDER_NOT_REGISTERED",
                format!("sender is not an active participant: {}", name),
            ),
            AppErr::Domain(DomainError::InvalidMessageType(value)) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_MESSAGE_TYPE",
                format!("unsupported message type: {}", value),
            ),
            AppErr::Domain(DomainError::InvalidLimit(value)) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_LIMIT",
                format!("limit must be a positive integer: {}", value),
            ),
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::Storage { message } => {
                    tracing::error!(error = %message, "存储访问失败");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        format!("storage error: {}", message),
                    )
                }
            },
            AppErr::Infrastructure(message) => {
                tracing::error!(error = %message, "基础设施错误");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFRASTRUCTURE_ERROR",
                    message,
                )
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::validation(errors.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
