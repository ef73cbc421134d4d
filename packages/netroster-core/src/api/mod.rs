//! HTTP surface over [`DeviceService`].
//!
//! - `GET /` HTML device table
//! - `GET /api/devices` merged listing as JSON
//! - `GET /api/device/{address}` annotation (defaults if unseen)
//! - `POST /api/device/{address}` overwrite an annotation
//! - `GET /health`

mod render;

use crate::error::StoreError;
use crate::service::{AnnotationPayload, DeviceService, DeviceView};
use crate::store::AnnotationRecord;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

pub use render::render_device_table;

pub fn router(service: DeviceService) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/devices", get(list_devices))
        .route("/api/device/{address}", get(get_device).post(update_device))
        .with_state(service)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn index(State(service): State<DeviceService>) -> Html<String> {
    let devices = service.list_devices().await;
    Html(render_device_table(&devices, chrono::Utc::now()))
}

async fn list_devices(State(service): State<DeviceService>) -> Json<Vec<DeviceView>> {
    Json(service.list_devices().await)
}

async fn get_device(
    State(service): State<DeviceService>,
    Path(address): Path<String>,
) -> Json<AnnotationRecord> {
    Json(service.get_annotation(&address).await)
}

async fn update_device(
    State(service): State<DeviceService>,
    Path(address): Path<String>,
    Json(payload): Json<AnnotationPayload>,
) -> Result<Json<StatusBody>, ApiError> {
    service.set_annotation(&address, payload.into()).await?;
    Ok(Json(StatusBody {
        status: "success",
        error: None,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = StatusBody {
            status: "error",
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}
