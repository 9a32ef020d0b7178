//! mc-domain-proxy/src/control.rs
//! The control-plane adapter: converts operator HTTP requests into routing
//! table mutations and registry lookups/kicks. The REST shape itself is not
//! load-bearing for the core (see spec's out-of-scope collaborators); only
//! the semantic operations below are.

use crate::error::ControlError;
use crate::state::AppState;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/routes", get(list_routes).post(create_route))
        .route("/routes/{domain}", get(get_route).put(upsert_route).delete(remove_route))
        .route("/kick/id/{id}", post(kick_by_id))
        .route("/kick/username", post(kick_by_username))
        .route("/kick/ip", post(kick_by_ip))
        .route("/kick/uuid", post(kick_by_uuid))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(app.clone(), require_api_key))
        .with_state(app)
}

async fn require_api_key(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    match headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) {
        None => ControlError::MissingApiKey.into_response(),
        Some(key) if key == app.config.api_key => next.run(request).await,
        Some(_) => ControlError::BadApiKey.into_response(),
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::MissingApiKey => StatusCode::UNAUTHORIZED,
            ControlError::BadApiKey => StatusCode::FORBIDDEN,
            ControlError::NotFound => StatusCode::NOT_FOUND,
            ControlError::Duplicate => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct RouteView {
    domain: String,
    host: String,
    port: u16,
}

async fn list_routes(State(app): State<Arc<AppState>>) -> Json<Vec<RouteView>> {
    let views = app
        .routes
        .list()
        .into_iter()
        .map(|(domain, route)| RouteView {
            domain,
            host: route.host,
            port: route.port,
        })
        .collect();
    Json(views)
}

async fn get_route(
    State(app): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<Json<RouteView>, ControlError> {
    let route = app.routes.get(&domain).ok_or(ControlError::NotFound)?;
    Ok(Json(RouteView {
        domain: crate::routes::normalize_domain(&domain),
        host: route.host,
        port: route.port,
    }))
}

#[derive(Deserialize)]
struct UpsertRouteBody {
    host: String,
    port: u16,
}

fn validate_route_fields(host: &str, port: u16) -> Result<(), ControlError> {
    if host.trim().is_empty() {
        return Err(ControlError::Validation("host must not be empty".to_string()));
    }
    if port == 0 {
        return Err(ControlError::Validation("port must be in 1..65535".to_string()));
    }
    Ok(())
}

#[derive(Deserialize)]
struct CreateRouteBody {
    domain: String,
    host: String,
    port: u16,
}

/// `POST /routes`: create-only, 409 on an existing domain.
async fn create_route(
    State(app): State<Arc<AppState>>,
    Json(body): Json<CreateRouteBody>,
) -> Result<StatusCode, ControlError> {
    if body.domain.trim().is_empty() {
        return Err(ControlError::Validation("domain must not be empty".to_string()));
    }
    validate_route_fields(&body.host, body.port)?;
    if app.routes.contains(&body.domain) {
        return Err(ControlError::Duplicate);
    }
    app.routes
        .upsert(&body.domain, body.host, body.port)
        .await
        .map_err(|e| ControlError::Validation(e.to_string()))?;
    Ok(StatusCode::CREATED)
}

/// `PUT /routes/:domain`: idempotent upsert.
async fn upsert_route(
    State(app): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Json(body): Json<UpsertRouteBody>,
) -> Result<StatusCode, ControlError> {
    if domain.trim().is_empty() {
        return Err(ControlError::Validation("domain must not be empty".to_string()));
    }
    validate_route_fields(&body.host, body.port)?;
    app.routes
        .upsert(&domain, body.host, body.port)
        .await
        .map_err(|e| ControlError::Validation(e.to_string()))?;
    Ok(StatusCode::OK)
}

async fn remove_route(
    State(app): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<StatusCode, ControlError> {
    let removed = app
        .routes
        .remove(&domain)
        .await
        .map_err(|e| ControlError::Validation(e.to_string()))?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ControlError::NotFound)
    }
}

#[derive(Serialize)]
struct KickResult {
    kicked: usize,
}

#[derive(Deserialize)]
struct KickByUsernameBody {
    name: String,
    port: u16,
}

#[derive(Deserialize)]
struct KickByIpBody {
    ip: String,
    port: u16,
}

#[derive(Deserialize)]
struct KickByUuidBody {
    uuid: String,
    port: u16,
}

async fn kick_by_username(
    State(app): State<Arc<AppState>>,
    Json(body): Json<KickByUsernameBody>,
) -> Result<Json<KickResult>, ControlError> {
    let matches = app.registry.by_username(&body.name, body.port);
    kick_matches(&app, matches)
}

async fn kick_by_ip(
    State(app): State<Arc<AppState>>,
    Json(body): Json<KickByIpBody>,
) -> Result<Json<KickResult>, ControlError> {
    let matches = app.registry.by_ip(&body.ip, body.port);
    kick_matches(&app, matches)
}

async fn kick_by_uuid(
    State(app): State<Arc<AppState>>,
    Json(body): Json<KickByUuidBody>,
) -> Result<Json<KickResult>, ControlError> {
    let matches = app.registry.by_uuid(&body.uuid, body.port);
    kick_matches(&app, matches)
}

fn kick_matches(
    app: &Arc<AppState>,
    matches: Vec<crate::registry::ConnectionRecord>,
) -> Result<Json<KickResult>, ControlError> {
    let kicked = matches
        .into_iter()
        .filter(|record| app.registry.kick(record.id))
        .count();
    if kicked == 0 {
        Err(ControlError::NotFound)
    } else {
        Ok(Json(KickResult { kicked }))
    }
}

async fn kick_by_id(
    State(app): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ControlError> {
    if app.registry.kick(id) {
        Ok(StatusCode::OK)
    } else {
        Err(ControlError::NotFound)
    }
}
