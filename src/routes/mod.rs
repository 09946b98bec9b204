// Route exports
pub mod admin;
pub mod auth;
pub mod extract;
pub mod profiles;

use crate::core::{MissingProfilePolicy, PageLimits};
use crate::models::HealthResponse;
use crate::services::{DeviceNotifier, IdentityStore, Store, TokenIssuer};
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenIssuer,
    pub notifier: Arc<dyn DeviceNotifier>,
    pub discovery: MissingProfilePolicy,
    pub pagination: PageLimits,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api")
            .configure(auth::configure)
            .configure(profiles::configure)
            .configure(admin::configure),
    );
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.store.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        service: "matrimony".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}
