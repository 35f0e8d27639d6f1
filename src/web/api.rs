//! Defines the Axum API routes and handlers.
//!
//! Status and draw requests read the published views directly; actions and
//! line drives go through the simulation thread.

use crate::web::models::{
    ActionRequest, ActionResponse, DeviceStatus, DrawResponse, DriveRequest, LineResponse, StatusResponse,
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use boardsim_simulator::{DriverError, SimHandle};

pub type AppState = SimHandle;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(sim: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/devices/{name}/draw", get(get_draw))
        .route("/api/v1/action", post(run_action))
        .route("/api/v1/lines/{name}", get(get_line).post(drive_line))
        .with_state(sim)
}

fn error_status(e: &DriverError) -> StatusCode {
    match e {
        DriverError::Disconnected => StatusCode::SERVICE_UNAVAILABLE,
        DriverError::Rejected(_) => StatusCode::BAD_REQUEST,
    }
}

/// Handler to get the clock and every device view.
async fn get_status(State(sim): State<AppState>) -> Json<StatusResponse> {
    let cycle = sim.cycle();
    let devices = sim
        .views()
        .iter()
        .map(|(name, view)| DeviceStatus {
            name: name.clone(),
            view: view.snapshot(),
        })
        .collect();
    Json(StatusResponse {
        cycle,
        seconds: cycle as f64 / sim.clock_hz().max(1) as f64,
        devices,
    })
}

async fn get_draw(State(sim): State<AppState>, Path(name): Path<String>) -> Result<Json<DrawResponse>, StatusCode> {
    let view = sim.view(&name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(DrawResponse {
        text: view.draw(),
        simple: view.draw_simple(),
        name,
    }))
}

/// Handler to run one scripted action.
async fn run_action(
    State(sim): State<AppState>,
    Json(payload): Json<ActionRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    match sim.invoke(&payload.target, &payload.action, payload.args).await {
        Ok(status) => (
            StatusCode::OK,
            Json(ActionResponse {
                status: status.as_str().to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(device = %payload.target, action = %payload.action, "action rejected: {e}");
            (
                error_status(&e),
                Json(ActionResponse {
                    status: "error".to_string(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

async fn get_line(State(sim): State<AppState>, Path(name): Path<String>) -> Result<Json<LineResponse>, StatusCode> {
    match sim.line_value(&name).await {
        Ok(value) => Ok(Json(LineResponse { line: name, value })),
        Err(DriverError::Rejected(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(error_status(&e)),
    }
}

/// Handler to drive an externally owned line.
async fn drive_line(
    State(sim): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<DriveRequest>,
) -> Result<Json<LineResponse>, (StatusCode, String)> {
    sim.drive(&name, payload.value)
        .await
        .map_err(|e| (error_status(&e), e.to_string()))?;
    let value = sim
        .line_value(&name)
        .await
        .map_err(|e| (error_status(&e), e.to_string()))?;
    Ok(Json(LineResponse { line: name, value }))
}
