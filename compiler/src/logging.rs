// logging.rs — tracing subscriber setup
//
// `RUST_LOG` wins over the `--log-level` flag. Human-readable output goes to
// stderr so generated code on stdout stays clean; `--log-json` switches the
// same layer to structured JSON for the service.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: String,
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(options: &LogOptions) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    if options.json {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr);
        Registry::default().with(env_filter).with(json_layer).try_init()?;
    } else {
        let text_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        Registry::default().with(env_filter).with(text_layer).try_init()?;
    }
    Ok(())
}
