//! Server wiring. Routes and handlers live in [`crate::authz::web`].
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;

use crate::authz::registry::RuleRegistry;
use crate::authz::web::AppState;
use crate::settings::Settings;

async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    // Decisions depend on the caller; never cache them.
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );
    response
}

pub fn app(
    settings: &Settings,
    registry: Arc<RuleRegistry>,
    db: Option<DatabaseConnection>,
) -> axum::Router {
    let state = AppState {
        registry,
        authz: Arc::new(settings.authz.clone()),
        db,
    };
    crate::authz::web::router(state).layer(middleware::from_fn(security_headers))
}

pub async fn serve(
    settings: Settings,
    registry: Arc<RuleRegistry>,
    db: Option<DatabaseConnection>,
) -> miette::Result<()> {
    if db.is_none() {
        tracing::warn!("No database configured; /v1/resources answers 503");
    }
    if settings.authz.trust_subject_headers {
        tracing::warn!("Trusting x-subject-* headers; run only behind a gateway that sets them");
    }

    let router = app(&settings, registry, db);

    let addr: SocketAddr = settings
        .bind_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Authorization API listening");
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}
