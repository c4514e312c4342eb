//! Response helpers.
//!
//! # Responsibilities
//! - Render handler errors as a small JSON body
//!
//! # Design Decisions
//! - `status` carries the canonical reason phrase, not the numeric code;
//!   the code is already on the status line

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// JSON body written by [`format_error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub reason: String,
}

/// Build a `{"status": ..., "reason": ...}` response with `status`.
pub fn format_error(status: StatusCode, err: impl fmt::Display) -> Response {
    let body = ErrorBody {
        status: status.canonical_reason().unwrap_or_default().to_owned(),
        reason: err.to_string(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::header;

    #[tokio::test]
    async fn error_body_is_json() {
        let response = format_error(StatusCode::BAD_REQUEST, "missing field `name`");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            ErrorBody {
                status: "Bad Request".into(),
                reason: "missing field `name`".into(),
            }
        );
    }
}
