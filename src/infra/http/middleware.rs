use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{application::error::ErrorReport, domain::types::Principal};

use super::public::CACHE_SOURCE_HEADER;

/// Response header echoing the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Trace which tier served each page and log failures with their
/// [`ErrorReport`].
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let authenticated = request
        .extensions()
        .get::<Principal>()
        .is_some_and(|principal| !principal.is_anonymous());
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis();

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        log_failure(Failure {
            status,
            method: &method,
            path: &path,
            elapsed_ms,
            request_id: &request_id,
            authenticated,
            report,
        });
    } else if let Some(served_by) = response
        .headers()
        .get(CACHE_SOURCE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        debug!(
            target = "townsfolk::http::response",
            status = status.as_u16(),
            path = %path,
            cache_source = served_by,
            elapsed_ms,
            request_id = %request_id,
            "page served"
        );
    }

    response
}

struct Failure<'a> {
    status: StatusCode,
    method: &'a Method,
    path: &'a str,
    elapsed_ms: u128,
    request_id: &'a str,
    authenticated: bool,
    report: Option<ErrorReport>,
}

fn log_failure(failure: Failure<'_>) {
    let (source, messages) = match failure.report {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");

    if failure.status.is_server_error() {
        error!(
            target = "townsfolk::http::response",
            status = failure.status.as_u16(),
            method = %failure.method,
            path = failure.path,
            elapsed_ms = failure.elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = failure.request_id,
            authenticated = failure.authenticated,
            "request failed"
        );
    } else {
        warn!(
            target = "townsfolk::http::response",
            status = failure.status.as_u16(),
            method = %failure.method,
            path = failure.path,
            elapsed_ms = failure.elapsed_ms,
            source,
            detail,
            request_id = failure.request_id,
            authenticated = failure.authenticated,
            "client request error"
        );
    }
}

/// Attach the bearer-token [`Principal`] to the request; absent or malformed
/// headers yield an anonymous principal.
pub async fn attach_principal(mut request: Request<Body>, next: Next) -> Response {
    let principal = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.split_once(' ')?;
            scheme
                .eq_ignore_ascii_case("bearer")
                .then(|| Principal::from_bearer(token))
        })
        .unwrap_or_default();
    request.extensions_mut().insert(principal);
    next.run(request).await
}
