use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Hub(String),
}

impl ControlError {
    fn status(&self) -> StatusCode {
        match self {
            ControlError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::Hub(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An operator action failed; carries the message shown alongside the error.
#[derive(Debug)]
pub struct ActionError {
    pub error: ControlError,
    pub message: String,
}

impl ActionError {
    pub fn new(error: ControlError, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = Json(json!({
            "success": false,
            "error": self.error.to_string(),
            "message": self.message,
            "timestamp": super::timestamp(),
        }));
        (status, body).into_response()
    }
}
