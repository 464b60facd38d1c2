use std::sync::Arc;

use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authz::ability::AbilitySet;
use crate::authz::condition::Includes;
use crate::authz::engine;
use crate::authz::guard::AuditGuard;
use crate::authz::query::QueryPredicate;
use crate::authz::registry::RuleRegistry;
use crate::authz::types::{Action, ResourceType, Subject};
use crate::errors::TribuneError;
use crate::settings::Authz;
use crate::storage::sql;
use crate::subject;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RuleRegistry>,
    pub authz: Arc<Authz>,
    pub db: Option<DatabaseConnection>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/abilities", get(handle_abilities))
        .route("/v1/authorize", post(handle_authorize))
        .route("/v1/filter", post(handle_filter))
        .route("/v1/me", get(handle_me))
        .route("/v1/resources/{resource_type}", get(handle_list_resources))
        .route(
            "/v1/resources/{resource_type}/{id}",
            axum::routing::delete(handle_delete_resource),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), audit))
        .route("/healthz", get(health))
        .with_state(state)
}

/// Attach an [`AuditGuard`] to the request and report unchecked requests
/// once the handler is done.
async fn audit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    // An upstream layer may already have authenticated the caller.
    let caller = request.extensions().get::<Subject>().cloned().or_else(|| {
        if state.authz.trust_subject_headers {
            subject::from_headers(request.headers())
        } else {
            None
        }
    });

    let (guard, audit) = AuditGuard::begin(Arc::clone(&state.registry), caller, route, method);
    request.extensions_mut().insert(guard);
    let response = next.run(request).await;
    audit.warn_unchecked(state.authz.warn_unchecked).finish();
    response
}

async fn handle_abilities(Extension(guard): Extension<AuditGuard>) -> Json<AbilitySet> {
    guard.disable_check_warning();
    Json(guard.ability().clone())
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub action: Action,
    pub instance: Value,
}

async fn handle_authorize(
    Extension(guard): Extension<AuditGuard>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<StatusCode, TribuneError> {
    guard.check_with(|ability| engine::can_json(ability, req.action, req.instance))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub action: Action,
    pub resource_type: ResourceType,
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    pub predicate: QueryPredicate,
    pub includes: Includes,
    pub sql: String,
}

async fn handle_filter(
    State(state): State<AppState>,
    Extension(guard): Extension<AuditGuard>,
    Json(req): Json<FilterRequest>,
) -> Result<Json<FilterResponse>, TribuneError> {
    let predicate = guard.allow_database_access_to(req.action, req.resource_type)?;
    let backend = state
        .db
        .as_ref()
        .map(|db| db.get_database_backend())
        .unwrap_or(DbBackend::Sqlite);
    let sql = sql::sql_preview(backend, state.registry.schema(), req.resource_type, &predicate)?;
    let includes = guard.ability().includes_for(req.action, req.resource_type);
    Ok(Json(FilterResponse {
        predicate,
        includes,
        sql,
    }))
}

async fn handle_me(Extension(guard): Extension<AuditGuard>) -> Result<Json<Subject>, TribuneError> {
    let subject = guard.must_be_logged_in()?;
    Ok(Json(subject.clone()))
}

#[derive(Debug, Serialize)]
pub struct ResourceList {
    pub resource_type: ResourceType,
    pub ids: Vec<String>,
}

async fn handle_list_resources(
    State(state): State<AppState>,
    Extension(guard): Extension<AuditGuard>,
    Path(resource_type): Path<String>,
) -> Result<Json<ResourceList>, TribuneError> {
    let resource_type = parse_resource_type(&resource_type)?;
    let predicate = guard.allow_database_access_to(Action::List, resource_type)?;
    let db = state.db.as_ref().ok_or(TribuneError::NoDatabase)?;
    let ids = sql::select_ids(db, state.registry.schema(), resource_type, &predicate).await?;
    Ok(Json(ResourceList { resource_type, ids }))
}

/// 404 both when the row is missing and when the caller may not delete it.
async fn handle_delete_resource(
    State(state): State<AppState>,
    Extension(guard): Extension<AuditGuard>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<StatusCode, TribuneError> {
    let resource_type = parse_resource_type(&resource_type)?;
    let predicate = guard.allow_database_access_to(Action::Delete, resource_type)?;
    let db = state.db.as_ref().ok_or(TribuneError::NoDatabase)?;
    if sql::delete_guarded(db, state.registry.schema(), resource_type, &id, &predicate).await? {
        tracing::info!(%resource_type, %id, "Deleted resource");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

fn parse_resource_type(raw: &str) -> Result<ResourceType, TribuneError> {
    raw.parse()
        .map_err(|_| TribuneError::BadRequest(format!("unknown resource type `{raw}`")))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
