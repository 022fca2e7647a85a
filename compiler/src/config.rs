// config.rs — Companion service configuration
//
// `ServeArgs` is the clap surface (flags with environment fallbacks);
// `ServiceConfig` is the validated value the service runs on. Tests build
// `ServiceConfig` directly from `Default`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;

use crate::codegen::{ButtonPolicy, GeneratorOptions};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_FQBN: &str = "esp32:esp32:esp32";
pub const DEFAULT_UPLOAD_PORT: &str = "COM3";
pub const SKETCH_NAME: &str = "temp_sketch";

/// Flags of `blockc serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "BLOCKC_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// TCP port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory served as static assets (the editor UI)
    #[arg(long, default_value = ".")]
    pub static_dir: PathBuf,

    /// Directory the generated sketch is written to
    #[arg(long, default_value = SKETCH_NAME)]
    pub sketch_dir: PathBuf,

    /// Toolchain executable
    #[arg(long, env = "ARDUINO_CLI", default_value = "arduino-cli")]
    pub arduino_cli: PathBuf,

    /// Fully qualified board name
    #[arg(long, default_value = DEFAULT_FQBN)]
    pub fqbn: String,

    /// Serial port used when an upload request names none
    #[arg(long, default_value = DEFAULT_UPLOAD_PORT)]
    pub default_upload_port: String,

    #[arg(long, default_value_t = 45)]
    pub compile_timeout_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub upload_timeout_secs: u64,

    /// How long a detected port list is reused
    #[arg(long, default_value_t = 2500)]
    pub port_cache_ms: u64,

    /// Largest accepted request body
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Generate `!digitalRead(P)` for button blocks (active-low wiring)
    #[arg(long)]
    pub button_active_low: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub static_dir: PathBuf,
    pub sketch_dir: PathBuf,
    pub arduino_cli: PathBuf,
    pub fqbn: String,
    pub default_upload_port: String,
    pub compile_timeout: Duration,
    pub upload_timeout: Duration,
    pub port_cache_ttl: Duration,
    pub max_body_bytes: usize,
    pub generator: GeneratorOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            static_dir: PathBuf::from("."),
            sketch_dir: PathBuf::from(SKETCH_NAME),
            arduino_cli: PathBuf::from("arduino-cli"),
            fqbn: DEFAULT_FQBN.to_string(),
            default_upload_port: DEFAULT_UPLOAD_PORT.to_string(),
            compile_timeout: Duration::from_secs(45),
            upload_timeout: Duration::from_secs(30),
            port_cache_ttl: Duration::from_millis(2500),
            max_body_bytes: 10 * 1024 * 1024,
            generator: GeneratorOptions::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_args(args: ServeArgs) -> Result<Self> {
        let config = ServiceConfig {
            bind: SocketAddr::new(args.bind, args.port),
            static_dir: args.static_dir,
            sketch_dir: args.sketch_dir,
            arduino_cli: args.arduino_cli,
            fqbn: args.fqbn,
            default_upload_port: args.default_upload_port,
            compile_timeout: Duration::from_secs(args.compile_timeout_secs),
            upload_timeout: Duration::from_secs(args.upload_timeout_secs),
            port_cache_ttl: Duration::from_millis(args.port_cache_ms),
            max_body_bytes: args.max_body_bytes,
            generator: GeneratorOptions {
                button_policy: if args.button_active_low {
                    ButtonPolicy::ActiveLow
                } else {
                    ButtonPolicy::Raw
                },
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.fqbn.split(':').count() < 3 {
            bail!("fqbn '{}' must look like vendor:arch:board", self.fqbn);
        }
        if self.compile_timeout.is_zero() || self.upload_timeout.is_zero() {
            bail!("toolchain timeouts must be greater than 0");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be greater than 0");
        }
        Ok(())
    }

    /// `<sketch_dir>/<sketch_dir name>.ino`; arduino-cli wants the file to
    /// match its folder.
    pub fn sketch_file(&self) -> PathBuf {
        let stem = self
            .sketch_dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| SKETCH_NAME.to_string());
        self.sketch_dir.join(format!("{}.ino", stem))
    }
}
