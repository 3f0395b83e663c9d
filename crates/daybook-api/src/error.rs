use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use daybook_core::Error;
use daybook_types::api::ErrorResponse;

/// Handler error: either a bare status or a core error carrying a message.
#[derive(Debug)]
pub enum ApiError {
    Status(StatusCode),
    Core(Error),
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Core(e)
    }
}

pub(crate) fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::SourceUnavailable(_) | Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::SourceExhausted(_) | Error::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Status(status) => status.into_response(),
            Self::Core(e) => {
                let status = status_for(&e);
                match &e {
                    Error::ServiceUnavailable(_) | Error::SourceExhausted(_) => error!("{}", e),
                    Error::GenerationFailed(_) | Error::SourceUnavailable(_) => warn!("{}", e),
                    _ => {}
                }
                (status, Json(ErrorResponse { error: e.to_string() })).into_response()
            }
        }
    }
}
