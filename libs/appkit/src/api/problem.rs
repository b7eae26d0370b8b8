//! RFC 9457 problem details, the uniform failure body of every endpoint.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::binder::DispatchError;

pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    pub status: u16,
    /// The original error message.
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: "about:blank".to_string(),
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match serde_json::to_vec(&self) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize problem response");
                return status.into_response();
            }
        };
        (status, [(header::CONTENT_TYPE, APPLICATION_PROBLEM_JSON)], body).into_response()
    }
}

impl From<DispatchError> for Problem {
    fn from(err: DispatchError) -> Self {
        let detail = err.to_string();
        match err {
            DispatchError::UnknownPath(path) => {
                Problem::new(StatusCode::NOT_FOUND, "Not Found", detail).with_instance(path)
            }
            DispatchError::NotReady(_) => {
                Problem::new(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable", detail)
            }
            DispatchError::InvalidInput { .. } => {
                Problem::new(StatusCode::UNPROCESSABLE_ENTITY, "Unprocessable Entity", detail)
            }
            DispatchError::Handler { .. } | DispatchError::InvalidOutput { .. } => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                detail,
            ),
        }
    }
}
