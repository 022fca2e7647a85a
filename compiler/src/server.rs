// server.rs — Companion HTTP service (axum)
//
// Routes:
//   POST /generate  {workspace}      → {code, diagnostics, roots}
//   POST /compile   {code}           → toolchain reply
//   POST /upload    {code, port?}    → toolchain reply
//   GET  /ports                      → PortListing
//   GET  /kinds                      → registry canonical JSON
//   anything else                    → static assets
//
// Preconditions: `ServiceConfig` validated.
// Postconditions: toolchain failures are replies (200, `success: false`),
//                 never lost sketches; only bad requests and sketch write
//                 failures are HTTP errors.
// Side effects: writes the sketch file, spawns toolchain processes.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::codegen::RuleTable;
use crate::config::ServiceConfig;
use crate::pipeline::{generate_source, generate_value, GenerateResult};
use crate::ports::{PortCache, PortListing};
use crate::registry::Registry;
use crate::toolchain::{self, ToolchainError};
use crate::workspace::{discard, parse_json, LoadError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub registry: Arc<Registry>,
    pub rules: Arc<RuleTable>,
    pub ports: Arc<PortCache>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        let ports = Arc::new(PortCache::new(config.port_cache_ttl));
        AppState {
            config: Arc::new(config),
            registry: Arc::new(Registry::esp32()),
            rules: Arc::new(RuleTable::esp32()),
            ports,
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub port: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToolchainReply {
    pub success: bool,
    pub stage: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No code provided")]
    NoCode,
    #[error("Invalid workspace")]
    Workspace(#[from] LoadError),
    #[error("Failed to save sketch")]
    Sketch(#[source] ToolchainError),
    #[error("Generation failed")]
    Generation(#[source] tokio::task::JoinError),
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::NoCode | ServiceError::Workspace(_) => StatusCode::BAD_REQUEST,
            ServiceError::Sketch(_) | ServiceError::Generation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = match &self {
            ServiceError::NoCode => serde_json::json!({ "error": self.to_string() }),
            ServiceError::Workspace(e) => {
                serde_json::json!({ "error": self.to_string(), "details": e.to_string() })
            }
            ServiceError::Sketch(e) => {
                error!(error = %e, "sketch write failed");
                serde_json::json!({ "error": self.to_string(), "details": e.to_string() })
            }
            ServiceError::Generation(e) => {
                error!(error = %e, "generation task did not complete");
                serde_json::json!({ "error": self.to_string() })
            }
        };
        (self.status(), Json(body)).into_response()
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    let max_body = state.config.max_body_bytes;
    Router::new()
        .route("/generate", post(generate_sketch))
        .route("/compile", post(compile_sketch))
        .route("/upload", post(upload_sketch))
        .route("/ports", get(list_ports))
        .route("/kinds", get(list_kinds))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C. An address already in use is taken to mean
/// another instance is serving and is not an error.
pub async fn run_server(config: ServiceConfig) -> Result<()> {
    let bind_addr = config.bind;
    let app = create_router(AppState::new(config));

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            warn!("{} already in use; assuming the service is already running", bind_addr);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!("blockc service listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── Handlers ───────────────────────────────────────────────────────────────

async fn generate_sketch(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<GenerateResult>, ServiceError> {
    let result = tokio::task::spawn_blocking(move || generate_from_body(&state, &body))
        .await
        .map_err(ServiceError::Generation)??;
    info!(
        roots = result.roots,
        diagnostics = result.diagnostics.len(),
        "sketch generated"
    );
    Ok(Json(result))
}

/// Body is `{"workspace": ...}` holding the document inline or as JSON
/// text. Parsed by hand: workspace documents nest deeper than the `Json`
/// extractor allows.
fn generate_from_body(state: &AppState, body: &str) -> Result<GenerateResult, LoadError> {
    let mut envelope = parse_json(body)?;
    let workspace = envelope
        .get_mut("workspace")
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null);
    discard(envelope);
    let options = state.config.generator;
    match workspace {
        serde_json::Value::String(text) => {
            generate_source(&text, &state.registry, &state.rules, options)
        }
        value => generate_value(value, &state.registry, &state.rules, options),
    }
}

async fn compile_sketch(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<ToolchainReply>, ServiceError> {
    let config = &state.config;
    let sketch = save(config, &req.code).await?;
    let file = sketch.display().to_string();

    let reply = match toolchain::compile(config, &sketch).await {
        Ok(out) => ToolchainReply {
            success: true,
            stage: "Compile Complete",
            message: "Compilation successful".to_string(),
            output: Some(out.stdout),
            error: None,
            file,
        },
        Err(e) => {
            warn!(error = %e, "compile failed");
            ToolchainReply {
                success: false,
                stage: "Compile Failed",
                message: "Compilation failed or arduino-cli not installed.".to_string(),
                output: None,
                error: Some(e.to_string()),
                file,
            }
        }
    };
    Ok(Json(reply))
}

async fn upload_sketch(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<ToolchainReply>, ServiceError> {
    let config = &state.config;
    let sketch = save(config, &req.code).await?;
    let file = sketch.display().to_string();
    let port = req
        .port
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| config.default_upload_port.clone());

    let uploaded = match toolchain::compile(config, &sketch).await {
        Ok(_) => toolchain::upload(config, &sketch, &port).await,
        Err(e) => Err(e),
    };

    let reply = match uploaded {
        Ok(out) => {
            info!(%port, "upload complete");
            ToolchainReply {
                success: true,
                stage: "Upload Complete",
                message: format!("Successfully uploaded to {}", port),
                output: Some(out.stdout),
                error: None,
                file,
            }
        }
        Err(e) => {
            warn!(error = %e, %port, "upload failed; sketch kept for manual upload");
            ToolchainReply {
                success: false,
                stage: "Code Generated",
                message: format!("Code saved to {}. Upload manually via Arduino IDE.", file),
                output: None,
                error: Some(e.to_string()),
                file,
            }
        }
    };
    Ok(Json(reply))
}

async fn list_ports(State(state): State<AppState>) -> Json<PortListing> {
    Json(state.ports.list(&state.config).await)
}

async fn list_kinds(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        state.registry.canonical_json(),
    )
}

async fn save(config: &ServiceConfig, code: &str) -> Result<std::path::PathBuf, ServiceError> {
    if code.trim().is_empty() {
        return Err(ServiceError::NoCode);
    }
    toolchain::write_sketch(config, code)
        .await
        .map_err(ServiceError::Sketch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(ServiceError::NoCode.status(), StatusCode::BAD_REQUEST);
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ServiceError::Sketch(ToolchainError::Write {
            path: "x.ino".into(),
            source: io,
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reply_omits_absent_fields() {
        let reply = ToolchainReply {
            success: true,
            stage: "Compile Complete",
            message: "Compilation successful".to_string(),
            output: Some(String::new()),
            error: None,
            file: "temp_sketch/temp_sketch.ino".to_string(),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["stage"], "Compile Complete");
    }
}
