//! JSON response envelopes.
//!
//! Every response body produced by the server is one of two shapes:
//!
//! ```json
//! { "success": true, "data": { ... }, "from_cache": false }
//! { "success": false, "error": { "code": "bad_request", "message": "..." } }
//! ```
//!
//! Bodies are serialized pretty-printed and fully buffered before they are
//! written, so a client never receives a partial envelope.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            from_cache: None,
            pagination: None,
        }
    }

    pub const fn cached(data: T, from_cache: bool) -> Self {
        Self {
            success: true,
            data,
            from_cache: Some(from_cache),
            pagination: None,
        }
    }

    pub const fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            from_cache: None,
            pagination: Some(pagination),
        }
    }
}

/// Response extension telling the usage log whether the payload came from cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheStatus(pub bool);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let from_cache = self.from_cache;
        let mut response = PrettyJson(self).into_response();
        if let Some(hit) = from_cache {
            response.extensions_mut().insert(CacheStatus(hit));
        }
        response
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(total: i64, limit: i64, offset: i64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset.saturating_add(limit) < total,
        }
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &'static str, message: String) -> Self {
        Self {
            success: false,
            error: ErrorDetail { code, message },
        }
    }
}

/// JSON responder that pretty-prints its payload.
pub struct PrettyJson<T>(pub T);

impl<T: Serialize> IntoResponse for PrettyJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec_pretty(&self.0) {
            Ok(bytes) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                bytes,
            )
                .into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    )],
                    r#"{"success":false,"error":{"code":"internal_error","message":"An internal error occurred"}}"#,
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_reports_more_pages() {
        assert!(Pagination::new(120, 50, 50).has_more);
        assert!(!Pagination::new(120, 50, 100).has_more);
        assert!(!Pagination::new(0, 50, 0).has_more);
    }

    #[test]
    fn pagination_saturates_at_the_largest_offset() {
        let page = Pagination::new(3, 100, i64::MAX);
        assert!(!page.has_more);
        assert_eq!(page.offset, i64::MAX);
    }

    #[test]
    fn success_envelope_omits_absent_fields() {
        let value = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(value, serde_json::json!({ "success": true, "data": 1 }));

        let value = serde_json::to_value(ApiResponse::cached("x", true)).unwrap();
        assert_eq!(value["from_cache"], true);
    }
}
