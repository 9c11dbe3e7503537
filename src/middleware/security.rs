// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Loopback guard for the local UI API.

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

/// Host names the API answers to. It only ever binds to 127.0.0.1.
const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Strip an optional `:port` from a Host header value.
fn host_name(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn is_loopback_host(host: &str) -> bool {
    let name = host_name(host);
    LOOPBACK_HOSTS
        .iter()
        .any(|allowed| name.eq_ignore_ascii_case(allowed))
}

/// Refuse requests addressed to a non-loopback host name (DNS rebinding) and
/// mark every response as uncacheable.
pub async fn local_only(req: Request, next: Next) -> Response {
    if let Some(host) = req.headers().get(header::HOST) {
        let allowed = host.to_str().map(is_loopback_host).unwrap_or(false);
        if !allowed {
            tracing::warn!(host = ?host, "Rejected request for foreign host");
            return AppError::Forbidden("Host not allowed".to_string()).into_response();
        }
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(local_only))
    }

    fn request(host: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_loopback_hosts() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("127.0.0.1:8787"));
        assert!(is_loopback_host("LOCALHOST:5173"));
        assert!(is_loopback_host("[::1]:8787"));
        assert!(!is_loopback_host("evil.example.com"));
        assert!(!is_loopback_host("localhost.evil.example.com:8787"));
    }

    #[tokio::test]
    async fn test_loopback_request_gets_headers() {
        let response = app().oneshot(request(Some("127.0.0.1:8787"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("Cache-Control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_foreign_host_is_forbidden() {
        let response = app()
            .oneshot(request(Some("rebind.example.com:8787")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_host_is_allowed() {
        let response = app().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
