use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use sim_core::analysis::{SimulationRequest, SimulationResults};
use sim_core::config::SimulatorConfig;
use sim_core::engine::Engine;

use crate::schema::{ErrorBody, ErrorResponse, HealthResponse};

const FAILURE_HINT: &str = "check the netlist syntax and the analysis parameters";

pub struct HttpServerConfig {
    pub bind_addr: String,
    pub simulator: SimulatorConfig,
}

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<Engine>,
    version: Option<String>,
}

impl ApiState {
    pub fn new(engine: Engine, version: Option<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            version,
        }
    }
}

pub async fn run(config: HttpServerConfig) -> Result<(), String> {
    let simulator = config.simulator.clone();
    let state = tokio::task::spawn_blocking(move || {
        let engine = Engine::new(&simulator)?;
        let version = match engine.runner().version() {
            Ok(version) => Some(version),
            Err(err) => {
                log::warn!("could not read simulator version: {}", err);
                None
            }
        };
        Ok::<_, sim_core::Error>(ApiState::new(engine, version))
    })
    .await
    .map_err(|err| format!("startup task failed: {}", err))?
    .map_err(|err| err.to_string())?;

    log::info!(
        "using simulator {} ({})",
        state.engine.runner().executable().display(),
        state.version.as_deref().unwrap_or("unknown version")
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|err| format!("bind {} failed: {}", config.bind_addr, err))?;
    log::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .await
        .map_err(|err| format!("server error: {}", err))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/simulate", post(simulate))
        .route("/v1/health", get(health))
        .with_state(state)
}

async fn simulate(
    State(state): State<ApiState>,
    Json(request): Json<SimulationRequest>,
) -> Response {
    let engine = Arc::clone(&state.engine);
    let results = match tokio::task::spawn_blocking(move || engine.simulate(&request)).await {
        Ok(results) => results,
        Err(err) => {
            log::error!("simulation task failed: {}", err);
            return api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "simulation task failed",
                None,
            );
        }
    };
    results_response(results)
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(health_response(&state))
}

fn health_response(state: &ApiState) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        simulator: state.engine.runner().executable().display().to_string(),
        version: state.version.clone(),
    }
}

/// 200 with the results, or 400 carrying the failure message.
pub fn results_response(results: SimulationResults) -> Response {
    if results.success {
        return Json(results).into_response();
    }
    api_error(
        StatusCode::BAD_REQUEST,
        "SIMULATION_FAILED",
        &results.message,
        Some(vec![
            format!("analysis: {}", results.simulation_type),
            FAILURE_HINT.to_string(),
        ]),
    )
}

fn api_error(
    status: StatusCode,
    code: &str,
    message: &str,
    details: Option<Vec<String>>,
) -> Response {
    let body = ErrorResponse {
        error: ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
            details,
        },
    };
    (status, Json(body)).into_response()
}
