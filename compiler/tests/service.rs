// HTTP service tests: requests go straight into the router with
// `tower::ServiceExt::oneshot`; no socket is bound. The toolchain path
// points at a file that does not exist, so every compile/upload fails the
// way a machine without arduino-cli would.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use blockc::config::ServiceConfig;
use blockc::server::{create_router, AppState};

fn test_config(dir: &Path) -> ServiceConfig {
    ServiceConfig {
        static_dir: dir.join("public"),
        sketch_dir: dir.join("temp_sketch"),
        arduino_cli: dir.join("missing-arduino-cli"),
        ..ServiceConfig::default()
    }
}

fn app(config: ServiceConfig) -> Router {
    create_router(AppState::new(config))
}

fn fixture(name: &str) -> String {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(path).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let text = body.to_string();
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, text.len())
        .body(Body::from(text))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

// ── /generate ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_returns_code_and_diagnostics() {
    let tmp = tempfile::tempdir().unwrap();
    let workspace: Value = serde_json::from_str(&fixture("unconfigured_pin.json")).unwrap();
    let (status, body) = post_json(
        app(test_config(tmp.path())),
        "/generate",
        json!({ "workspace": workspace }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["code"]
        .as_str()
        .unwrap()
        .contains("  digitalWrite(5, HIGH);\n"));
    assert_eq!(body["diagnostics"][0]["code"], "W0101");
    assert_eq!(body["roots"], 1);
}

#[tokio::test]
async fn generate_accepts_serialized_workspace_text() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = post_json(
        app(test_config(tmp.path())),
        "/generate",
        json!({ "workspace": fixture("blink.json") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["code"]
        .as_str()
        .unwrap()
        .contains("  pinMode(13, OUTPUT);\n"));
    assert_eq!(body["diagnostics"], json!([]));
}

#[tokio::test]
async fn generate_rejects_malformed_workspace() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, body) = post_json(
        app(test_config(tmp.path())),
        "/generate",
        json!({ "workspace": "{\"blocks\": [" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid workspace");
    assert!(body["details"].as_str().is_some());
}

#[tokio::test]
async fn generate_handles_long_chains() {
    let tmp = tempfile::tempdir().unwrap();
    let blocks = 5_000;
    let mut workspace = String::from("[");
    for _ in 0..blocks - 1 {
        workspace.push_str(r#"{"type":"esp32_delay_ms","next":{"block":"#);
    }
    workspace.push_str(r#"{"type":"esp32_delay_ms"}"#);
    workspace.push_str(&"}}".repeat(blocks - 1));
    workspace.push(']');
    let (status, body) = post_json(
        app(test_config(tmp.path())),
        "/generate",
        json!({ "workspace": workspace }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"].as_str().unwrap().matches("delay(1000);").count(), blocks);
}

// ── /compile and /upload ────────────────────────────────────────────────────

#[tokio::test]
async fn empty_code_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    for uri in ["/compile", "/upload"] {
        let (status, body) =
            post_json(app(test_config(tmp.path())), uri, json!({ "code": "  \n" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body, json!({ "error": "No code provided" }));
    }
    assert!(!tmp.path().join("temp_sketch").exists());
}

#[tokio::test]
async fn compile_failure_keeps_the_sketch() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let sketch = config.sketch_file();
    let code = "void setup() {}\nvoid loop() {}\n";
    let (status, body) = post_json(app(config), "/compile", json!({ "code": code })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["stage"], "Compile Failed");
    assert_eq!(
        body["message"],
        "Compilation failed or arduino-cli not installed."
    );
    assert!(body["error"].as_str().unwrap().contains("failed to start"));
    assert_eq!(body["file"], sketch.display().to_string());
    assert_eq!(std::fs::read_to_string(&sketch).unwrap(), code);
}

#[tokio::test]
async fn upload_failure_points_at_the_saved_sketch() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let sketch = config.sketch_file().display().to_string();
    let (status, body) = post_json(
        app(config),
        "/upload",
        json!({ "code": "void setup() {}\nvoid loop() {}\n", "port": "COM7" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["stage"], "Code Generated");
    assert_eq!(
        body["message"],
        format!("Code saved to {}. Upload manually via Arduino IDE.", sketch)
    );
    assert_eq!(body["file"], sketch);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let config = ServiceConfig {
        max_body_bytes: 64,
        ..test_config(tmp.path())
    };
    let (status, _) = post_json(
        app(config),
        "/compile",
        json!({ "code": "x".repeat(1024) }),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ── GET routes ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn kinds_serves_the_catalogue() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, bytes) = get(app(test_config(tmp.path())), "/kinds").await;
    assert_eq!(status, StatusCode::OK);
    let shapes: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(shapes
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["kind"] == "esp32_digital_write"));
}

#[tokio::test]
async fn ports_always_lists_something() {
    let tmp = tempfile::tempdir().unwrap();
    let (status, bytes) = get(app(test_config(tmp.path())), "/ports").await;
    assert_eq!(status, StatusCode::OK);
    let listing: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(!listing["ports"].as_array().unwrap().is_empty());
    assert_eq!(listing["cached"], false);
}

#[tokio::test]
async fn static_assets_are_served() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    std::fs::create_dir_all(&config.static_dir).unwrap();
    std::fs::write(config.static_dir.join("index.html"), "<h1>blocks</h1>").unwrap();
    let (status, bytes) = get(app(config), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"<h1>blocks</h1>");
}
