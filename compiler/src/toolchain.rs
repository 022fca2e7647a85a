// toolchain.rs — Sketch persistence and arduino-cli invocation
//
// Preconditions: none; a missing toolchain is an ordinary failure.
// Postconditions: the sketch file exists before any toolchain step runs.
// Failure modes: `ToolchainError` (I/O, spawn, timeout, non-zero exit).
// Side effects: writes the sketch file; spawns child processes, which are
//               killed when their timeout elapses.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::config::ServiceConfig;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to write sketch {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{step} timed out after {}s", .after.as_secs())]
    Timeout { step: &'static str, after: Duration },
    #[error("{step} exited with status {code:?}: {stderr}")]
    Failed {
        step: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

/// Captured output of a successful toolchain step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Write `code` to the configured sketch file, creating the directory.
pub async fn write_sketch(config: &ServiceConfig, code: &str) -> Result<PathBuf, ToolchainError> {
    let path = config.sketch_file();
    let write_err = |source| ToolchainError::Write {
        path: path.clone(),
        source,
    };
    tokio::fs::create_dir_all(&config.sketch_dir)
        .await
        .map_err(write_err)?;
    tokio::fs::write(&path, code).await.map_err(write_err)?;
    tracing::debug!(path = %path.display(), bytes = code.len(), "sketch written");
    Ok(path)
}

pub async fn compile(config: &ServiceConfig, sketch: &Path) -> Result<StepOutput, ToolchainError> {
    let args = vec![
        "compile".to_string(),
        "--fqbn".to_string(),
        config.fqbn.clone(),
        sketch.display().to_string(),
    ];
    run_step(config, "compile", &args, config.compile_timeout).await
}

pub async fn upload(
    config: &ServiceConfig,
    sketch: &Path,
    port: &str,
) -> Result<StepOutput, ToolchainError> {
    let args = vec![
        "upload".to_string(),
        "-p".to_string(),
        port.to_string(),
        "--fqbn".to_string(),
        config.fqbn.clone(),
        sketch.display().to_string(),
    ];
    run_step(config, "upload", &args, config.upload_timeout).await
}

/// Run `arduino-cli` with `args` and return its stdout, if any.
pub async fn query(
    config: &ServiceConfig,
    args: &[String],
    timeout: Duration,
) -> Result<StepOutput, ToolchainError> {
    run_step(config, "query", args, timeout).await
}

async fn run_step(
    config: &ServiceConfig,
    step: &'static str,
    args: &[String],
    timeout: Duration,
) -> Result<StepOutput, ToolchainError> {
    let program = config.arduino_cli.display().to_string();
    tracing::info!(step, program = %program, ?args, "running toolchain");
    let child = Command::new(&config.arduino_cli)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolchainError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolchainError::Spawn {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            tracing::warn!(step, ?timeout, "toolchain step timed out");
            return Err(ToolchainError::Timeout {
                step,
                after: timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(ToolchainError::Failed {
            step,
            code: output.status.code(),
            stderr,
        });
    }
    Ok(StepOutput { stdout, stderr })
}
