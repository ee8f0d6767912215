//! Mapping from pipeline errors to the HTTP failure shape.
//!
//! Only auth (401) and quota (429) failures change the status code; every other failure is a
//! 200 with `success: false`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use giftpipe_core::{Error, QuotaStatus};
use serde::Serialize;

const UNAVAILABLE: &str = "gift suggestions are temporarily unavailable";

#[derive(Debug)]
pub struct ApiFailure(pub Error);

impl From<Error> for ApiFailure {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<QuotaStatus>,
}

impl ApiFailure {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::OK,
        }
    }

    /// The message shown to callers. Operator-side failures are logged, not echoed.
    fn public_message(&self) -> String {
        match &self.0 {
            Error::Backend(_) | Error::NotConfigured(_) => {
                tracing::error!(error = %self.0, "request failed");
                UNAVAILABLE.to_string()
            }
            Error::Unauthorized(_) | Error::QuotaExceeded(_) | Error::InvalidInput(_) => {
                tracing::info!(error = %self.0, "request rejected");
                self.0.to_string()
            }
            other => {
                tracing::warn!(error = %other, "request failed");
                other.to_string()
            }
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.public_message();
        let details = match self.0 {
            Error::QuotaExceeded(q) => Some(q),
            _ => None,
        };
        let body = FailureBody {
            success: false,
            error,
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn quota_failure_carries_details() {
        let resp = ApiFailure(Error::QuotaExceeded(QuotaStatus {
            limit: Some(5),
            remaining: Some(0),
            role: "free".to_string(),
            reset_time: Some("2026-10-20T00:00:00Z".to_string()),
        }))
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let v = body_json(resp).await;
        assert_eq!(v["success"], false);
        assert_eq!(v["details"]["remaining"], 0);
        assert_eq!(v["details"]["resetTime"], "2026-10-20T00:00:00Z");
    }

    #[tokio::test]
    async fn backend_detail_is_not_echoed() {
        let resp = ApiFailure(Error::Backend("rpc 500: relation users does not exist".into()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["error"], UNAVAILABLE);
        assert!(v.get("details").is_none());
    }

    #[tokio::test]
    async fn business_failures_stay_200() {
        for e in [
            Error::InvalidInput("budget is required".into()),
            Error::NoValidSuggestions("nothing matched".into()),
            Error::OverBudget("all picks above 20".into()),
        ] {
            let resp = ApiFailure(e).into_response();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_json(resp).await["success"], false);
        }
        let resp = ApiFailure(Error::Unauthorized("missing bearer token".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
