use actix_web::{get, web};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Liveness check. Needs no authentication and touches no store.
#[get("/health")]
pub async fn health() -> web::Json<HealthReport> {
    web::Json(HealthReport {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}
