//! Error handling for the camserver

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::device::DeviceError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Device transport / response-code error
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The camera did not acknowledge DeviceReady
    #[error("the camera is not ready")]
    CameraNotReady,

    /// The camera refused to enter live view; carries the decoded reason
    #[error("live view prohibited: {0}")]
    LiveViewProhibited(String),

    /// Live view is not active on the camera
    #[error("live view is not activated")]
    NotLiveView,

    /// A live-view reply shorter than the model header size
    #[error("the live view reply has insufficient length")]
    InsufficientData,

    /// A device property did not decode the way the protocol promises
    #[error("unexpected property form: {0}")]
    PropForm(String),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::CameraNotReady | Error::NotLiveView | Error::LiveViewProhibited(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CAMERA_UNAVAILABLE",
                self.to_string(),
            ),
            Error::Device(e) => (StatusCode::BAD_GATEWAY, "DEVICE_ERROR", e.to_string()),
            Error::InsufficientData | Error::PropForm(_) => {
                (StatusCode::BAD_GATEWAY, "DECODE_ERROR", self.to_string())
            }
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
