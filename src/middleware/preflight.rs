use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// `OPTIONS` never reaches authentication: 200 with an empty body.
///
/// CORS preflights carrying `Access-Control-Request-Method` are answered by
/// the `CorsLayer` before they get here.
pub async fn options_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}
