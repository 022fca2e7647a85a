// Command-line tests for `blockc`.
//
// Each test runs the built binary against fixtures under
// `compiler/tests/fixtures/` and checks exit status and output streams.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn blockc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_blockc"))
}

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run(args: &[&str]) -> Output {
    Command::new(blockc_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run blockc")
}

fn stdout_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── generate ────────────────────────────────────────────────────────────────

#[test]
fn generate_prints_the_sketch() {
    let blink = fixture_path("blink.json");
    let out = run(&["generate", blink.to_str().unwrap()]);
    assert!(out.status.success(), "stderr:\n{}", stderr_of(&out));
    let code = stdout_of(&out);
    assert!(code.starts_with("// Generated by ESP32 Blockly IDE\n"));
    assert!(code.contains("void setup() {\n  pinMode(13, OUTPUT);\n}\n"));
    assert!(stderr_of(&out).is_empty(), "unexpected stderr:\n{}", stderr_of(&out));
}

#[test]
fn generate_writes_output_file() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("blink.ino");
    let blink = fixture_path("blink.json");
    let out = run(&[
        "generate",
        blink.to_str().unwrap(),
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr:\n{}", stderr_of(&out));
    assert!(stdout_of(&out).is_empty());
    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.contains("  delay(500);\n"));
}

#[test]
fn generate_reads_stdin() {
    let mut child = Command::new(blockc_binary())
        .args(["generate", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn blockc");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"[{"type":"esp32_delay_ms","fields":{"DELAY":"250"}}]"#)
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    assert!(stdout_of(&out).contains("void loop() {\n  delay(250);\n}\n"));
}

#[test]
fn warnings_go_to_stderr() {
    let path = fixture_path("unconfigured_pin.json");
    let out = run(&["generate", path.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(stderr_of(&out).contains("blockc: warning[W0101]: pin 5 is used but never configured"));
    assert!(stdout_of(&out).contains("// WARNING: pin 5"));
}

#[test]
fn emit_diagnostics_as_json() {
    let path = fixture_path("unconfigured_pin.json");
    let out = run(&["generate", path.to_str().unwrap(), "--emit", "diagnostics"]);
    assert!(out.status.success());
    let diags: serde_json::Value = serde_json::from_str(&stdout_of(&out)).unwrap();
    let diags = diags.as_array().unwrap();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0]["code"], "W0101");
    assert_eq!(diags[0]["level"], "warning");
}

#[test]
fn emit_build_info() {
    let blink = fixture_path("blink.json");
    let out = run(&["generate", blink.to_str().unwrap(), "--emit", "build-info"]);
    assert!(out.status.success());
    let info: serde_json::Value = serde_json::from_str(&stdout_of(&out)).unwrap();
    assert_eq!(info["source_hash"].as_str().unwrap().len(), 64);
    assert_eq!(info["registry_fingerprint"].as_str().unwrap().len(), 64);
    assert_eq!(info["compiler_version"], env!("CARGO_PKG_VERSION"));

    let again = run(&["generate", blink.to_str().unwrap(), "--emit", "build-info"]);
    assert_eq!(out.stdout, again.stdout);
}

#[test]
fn verbose_reports_stages() {
    let blink = fixture_path("blink.json");
    let out = run(&["generate", blink.to_str().unwrap(), "--verbose"]);
    assert!(out.status.success());
    let err = stderr_of(&out);
    for stage in ["collect", "emit", "assemble"] {
        assert!(
            err.contains(&format!("blockc: {} complete", stage)),
            "missing {} in:\n{}",
            stage,
            err
        );
    }
}

#[test]
fn missing_input_exits_2() {
    let out = run(&["generate", "/nonexistent/workspace.json"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr_of(&out).contains("blockc: error:"));
}

#[test]
fn malformed_input_exits_1() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{\"blocks\": [").unwrap();
    let out = run(&["generate", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout_of(&out).is_empty());
}

// ── kinds ───────────────────────────────────────────────────────────────────

#[test]
fn kinds_lists_the_catalogue() {
    let out = run(&["kinds"]);
    assert!(out.status.success());
    let text = stdout_of(&out);
    for kind in ["esp32_pin_mode", "controls_if", "program_loop"] {
        assert!(
            text.lines().any(|l| l.starts_with(kind)),
            "{} missing",
            kind
        );
    }
}

#[test]
fn kinds_json_is_the_shape_catalogue() {
    let out = run(&["kinds", "--json"]);
    assert!(out.status.success());
    let shapes: serde_json::Value = serde_json::from_str(&stdout_of(&out)).unwrap();
    let shapes = shapes.as_array().unwrap();
    assert!(shapes.iter().any(|s| s["kind"] == "esp32_relay_blink"));
    let kinds: Vec<&str> = shapes.iter().filter_map(|s| s["kind"].as_str()).collect();
    let mut sorted = kinds.clone();
    sorted.sort();
    assert_eq!(kinds, sorted);
}
