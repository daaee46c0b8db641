use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::{
    application::{directory::DirectoryService, error::AppError, error::ErrorReport},
    cache::{CacheResult, FetchOptions},
    domain::types::Principal,
    infra::db::PostgresRepositories,
};

use super::{
    db_health_response,
    middleware::{attach_principal, log_responses, set_request_context},
};

/// Response header naming the tier that served a page.
pub const CACHE_SOURCE_HEADER: &str = "x-cache-source";

#[derive(Clone)]
pub struct HttpState {
    pub directory: Arc<DirectoryService>,
    pub db: Option<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(homepage))
        .route("/towns/{town}", get(town_detail))
        .route("/towns/{town}/{person}", get(person_detail))
        .route("/_ops/cache", get(cache_dashboard))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(attach_principal))
        .layer(middleware::from_fn(set_request_context))
}

async fn homepage(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, AppError> {
    let result = state
        .directory
        .get_cached_homepage_data(&principal, FetchOptions::default())
        .await?;
    Ok(page_response("infra::http::public::homepage", result))
}

async fn town_detail(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Path(town): Path<String>,
) -> Result<Response, AppError> {
    let result = state
        .directory
        .get_cached_town_data(&town, &principal, FetchOptions::default())
        .await?;
    Ok(page_response("infra::http::public::town_detail", result))
}

async fn person_detail(
    State(state): State<HttpState>,
    Extension(principal): Extension<Principal>,
    Path((town, person)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let result = state
        .directory
        .get_cached_person_data(&town, &person, &principal, FetchOptions::default())
        .await?;
    Ok(page_response("infra::http::public::person_detail", result))
}

async fn cache_dashboard(State(state): State<HttpState>) -> Response {
    Json(state.directory.cache().dashboard()).into_response()
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_message(
                "infra::http::public::health",
                StatusCode::SERVICE_UNAVAILABLE,
                "database not configured",
            )
            .attach(&mut response);
            response
        }
    }
}

/// Serialize a lookup result; a missing snapshot keeps the body but answers
/// 404.
fn page_response<T: Serialize>(source: &'static str, result: CacheResult<T>) -> Response {
    let status = if result.data.is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    let served_by = HeaderValue::from_static(result.source.as_str());

    let mut response = (status, Json(&result)).into_response();
    response
        .headers_mut()
        .insert(CACHE_SOURCE_HEADER, served_by);
    if status == StatusCode::NOT_FOUND {
        ErrorReport::from_message(source, status, "no listed entity for this path")
            .attach(&mut response);
    }
    response
}
