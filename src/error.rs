use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct ServerError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpErrorResponse {
    pub error: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { error: message }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            error: message.to_string(),
        }
    }
}

impl ServerError {
    pub fn new(status: StatusCode, message: impl Into<HttpErrorResponse>) -> Self {
        ServerError {
            status,
            message: message.into(),
        }
    }

    pub fn not_loaded() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Model not loaded")
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        tracing::error!("Request failed: {:#}", err);
        ServerError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(err.to_string()),
        }
    }
}

pub type ServerResult<T, E = ServerError> = Result<T, E>;

#[macro_export]
macro_rules! bail_server {
    ($error_message:expr) => {
        return Err($crate::error::ServerError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            $error_message,
        ))
    };
    ($status_code:expr, $error_message:expr) => {
        return Err($crate::error::ServerError::new($status_code, $error_message))
    };
    ($status:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::ServerError::new($status, format!($fmt $(, $arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn anyhow_errors_become_internal_server_errors() {
        let err = ServerError::from(anyhow!("tensor shape mismatch"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message.error, "tensor shape mismatch");
    }

    #[test]
    fn response_carries_status_and_error_body() {
        let res = ServerError::not_loaded().into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    fn rejects_with_format() -> ServerResult<()> {
        bail_server!(StatusCode::BAD_REQUEST, "Unknown field {}", "foo");
    }

    #[test]
    fn bail_macro_formats_message() {
        let err = rejects_with_format().unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message.error, "Unknown field foo");
    }
}
