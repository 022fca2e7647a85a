// ports.rs — Serial port discovery with a short-lived cache
//
// Strategies run in order and their results are merged: the toolchain's own
// board listing first, then an OS listing (`/dev` on Unix, the SERIALCOMM
// registry key on Windows). When nothing is found a synthetic list is
// offered so the user can still pick a port by hand.
//
// Preconditions: none; every strategy tolerates a missing tool.
// Postconditions: listings are deduplicated by path and sorted by the
//                 numeric suffix within each path prefix.
// Failure modes: none surfaced; strategy failures are logged and skipped.
// Side effects: spawns `arduino-cli` / `reg`; reads `/dev`.

use std::future::Future;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::ServiceConfig;
use crate::toolchain;

const PROBE_TIMEOUT: Duration = Duration::from_secs(4);
const FALLBACK_COM_PORTS: u32 = 64;
const FALLBACK_TTY_PORTS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub path: String,
    pub manufacturer: String,
    pub description: String,
}

impl PortInfo {
    fn new(path: impl Into<String>, manufacturer: &str, description: &str) -> Self {
        PortInfo {
            path: path.into(),
            manufacturer: manufacturer.to_string(),
            description: description.to_string(),
        }
    }
}

/// Body of `GET /ports` and output of `blockc ports`.
#[derive(Debug, Clone, Serialize)]
pub struct PortListing {
    pub ports: Vec<PortInfo>,
    /// Served from the cache without probing.
    pub cached: bool,
    /// Nothing was detected; `ports` is the synthetic list.
    pub fallback: bool,
}

// ── Parsing ────────────────────────────────────────────────────────────────

static SERIAL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:COM\d+)|/dev/(?:ttyUSB\d+|ttyACM\d+|cu\.[\w.-]+))$")
        .expect("serial path pattern is valid")
});

static REGISTRY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(COM\d+)\s*$").expect("registry line pattern is valid"));

/// Whether `path` names a device a board is plausibly attached to.
pub fn is_serial_path(path: &str) -> bool {
    SERIAL_PATH.is_match(path)
}

/// Parse `arduino-cli board list --format json`. Accepts both the bare array
/// of older releases and the `{"detected_ports": [...]}` object of newer ones.
pub fn parse_board_list(json: &str) -> Vec<PortInfo> {
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "unparsable board list");
            return Vec::new();
        }
    };
    let entries = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("detected_ports")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };
    entries
        .iter()
        .filter_map(|entry| {
            let port = entry.get("port")?;
            let path = port.get("address")?.as_str()?;
            let manufacturer = entry
                .get("matching_boards")
                .and_then(|boards| boards.get(0))
                .and_then(|board| board.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("arduino-cli");
            let description = port
                .get("protocol_label")
                .or_else(|| port.get("label"))
                .and_then(Value::as_str)
                .unwrap_or("Serial Port");
            Some(PortInfo::new(path, manufacturer, description))
        })
        .collect()
}

/// Parse `reg query HKLM\HARDWARE\DEVICEMAP\SERIALCOMM` output.
pub fn parse_registry(text: &str) -> Vec<PortInfo> {
    text.lines()
        .filter_map(|line| REGISTRY_LINE.captures(line))
        .map(|caps| PortInfo::new(&caps[1], "Registry", "Serial Port"))
        .collect()
}

/// Keep serial-looking entries of a `/dev` directory listing.
pub fn parse_dev_names<I, S>(names: I) -> Vec<PortInfo>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| format!("/dev/{}", name.as_ref()))
        .filter(|path| is_serial_path(path))
        .map(|path| PortInfo::new(path, "System", "Serial Port"))
        .collect()
}

// ── Normalization ──────────────────────────────────────────────────────────

fn sort_key(path: &str) -> (String, u64) {
    let digits = path.len() - path.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (prefix, suffix) = path.split_at(path.len() - digits);
    (prefix.to_ascii_uppercase(), suffix.parse().unwrap_or(0))
}

/// Drop non-serial paths and duplicates (first occurrence wins), then sort.
pub fn normalize(ports: Vec<PortInfo>) -> Vec<PortInfo> {
    let mut out: Vec<PortInfo> = Vec::with_capacity(ports.len());
    for port in ports {
        if is_serial_path(&port.path) && !out.iter().any(|p| p.path == port.path) {
            out.push(port);
        }
    }
    out.sort_by_cached_key(|p| sort_key(&p.path));
    out
}

/// Synthetic list offered when detection finds nothing.
pub fn fallback_ports(windows: bool) -> Vec<PortInfo> {
    if windows {
        (1..=FALLBACK_COM_PORTS)
            .map(|i| PortInfo::new(format!("COM{i}"), "Fallback", "Manual Select"))
            .collect()
    } else {
        let usb = (0..FALLBACK_TTY_PORTS).map(|i| format!("/dev/ttyUSB{i}"));
        let acm = (0..FALLBACK_TTY_PORTS).map(|i| format!("/dev/ttyACM{i}"));
        normalize(
            usb.chain(acm)
                .map(|p| PortInfo::new(p, "Fallback", "Manual Select"))
                .collect(),
        )
    }
}

// ── Detection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    BoardList,
    DevListing,
    Registry,
}

fn strategies() -> &'static [Strategy] {
    if cfg!(windows) {
        &[Strategy::BoardList, Strategy::Registry]
    } else {
        &[Strategy::BoardList, Strategy::DevListing]
    }
}

async fn run_strategy(strategy: Strategy, config: &ServiceConfig) -> Vec<PortInfo> {
    match strategy {
        Strategy::BoardList => {
            let args = ["board", "list", "--format", "json"].map(String::from);
            match toolchain::query(config, &args, PROBE_TIMEOUT).await {
                Ok(out) => parse_board_list(&out.stdout),
                Err(e) => {
                    tracing::debug!(error = %e, "board list unavailable");
                    Vec::new()
                }
            }
        }
        Strategy::DevListing => {
            let mut names = Vec::new();
            match tokio::fs::read_dir("/dev").await {
                Ok(mut dir) => {
                    while let Ok(Some(entry)) = dir.next_entry().await {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                Err(e) => tracing::debug!(error = %e, "cannot list /dev"),
            }
            parse_dev_names(names)
        }
        Strategy::Registry => {
            let output = tokio::process::Command::new("reg")
                .args(["query", r"HKLM\HARDWARE\DEVICEMAP\SERIALCOMM"])
                .kill_on_drop(true)
                .output();
            match tokio::time::timeout(PROBE_TIMEOUT, output).await {
                Ok(Ok(out)) => parse_registry(&String::from_utf8_lossy(&out.stdout)),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "registry query failed");
                    Vec::new()
                }
                Err(_) => {
                    tracing::debug!("registry query timed out");
                    Vec::new()
                }
            }
        }
    }
}

/// Run every strategy for this platform and merge the results.
pub async fn detect(config: &ServiceConfig) -> Vec<PortInfo> {
    let mut found = Vec::new();
    for &strategy in strategies() {
        let ports = run_strategy(strategy, config).await;
        tracing::debug!(?strategy, count = ports.len(), "port strategy finished");
        found.extend(ports);
    }
    normalize(found)
}

// ── Cache ──────────────────────────────────────────────────────────────────

struct CacheEntry {
    at: Instant,
    ports: Vec<PortInfo>,
}

/// Detected ports reused for `ttl`. Empty results and fallback lists are
/// never cached. The lock is held while probing so concurrent requests
/// share one detection.
pub struct PortCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl PortCache {
    pub fn new(ttl: Duration) -> Self {
        PortCache {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub async fn list(&self, config: &ServiceConfig) -> PortListing {
        self.list_with(|| detect(config)).await
    }

    pub async fn list_with<F, Fut>(&self, probe: F) -> PortListing
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<PortInfo>>,
    {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.at.elapsed() < self.ttl && !cached.ports.is_empty() {
                return PortListing {
                    ports: cached.ports.clone(),
                    cached: true,
                    fallback: false,
                };
            }
        }

        let ports = normalize(probe().await);
        if ports.is_empty() {
            tracing::info!("no serial ports detected, offering fallback list");
            *entry = None;
            return PortListing {
                ports: fallback_ports(cfg!(windows)),
                cached: false,
                fallback: true,
            };
        }
        *entry = Some(CacheEntry {
            at: Instant::now(),
            ports: ports.clone(),
        });
        PortListing {
            ports,
            cached: false,
            fallback: false,
        }
    }
}
