use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use blockc::codegen::{ButtonPolicy, GeneratorOptions, RuleTable};
use blockc::config::{ServeArgs, ServiceConfig};
use blockc::logging::{self, LogOptions};
use blockc::pipeline::{compute_provenance, Assembler};
use blockc::registry::Registry;
use blockc::workspace::load_workspace;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// The generated Arduino sketch
    Sketch,
    /// Provenance JSON (source hash, registry fingerprint, version)
    BuildInfo,
    /// Diagnostics as JSON
    Diagnostics,
}

#[derive(Parser, Debug)]
#[command(
    name = "blockc",
    version,
    about = "Block compiler for ESP32 — turns block-editor workspaces into Arduino sketches"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a sketch from a workspace JSON file
    Generate(GenerateArgs),
    /// List the registered block kinds
    Kinds {
        /// Print the full shape catalogue as JSON
        #[arg(long)]
        json: bool,
    },
    /// List serial ports a board may be attached to
    Ports {
        /// Toolchain executable used for board detection
        #[arg(long, env = "ARDUINO_CLI", default_value = "arduino-cli")]
        arduino_cli: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Run the companion HTTP service
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Workspace JSON file (`-` for stdin)
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Sketch)]
    emit: EmitStage,

    /// Generate `!digitalRead(P)` for button blocks (active-low wiring)
    #[arg(long)]
    button_active_low: bool,

    /// Print generation stages and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let log = LogOptions {
        level: cli.log_level.clone(),
        json: cli.log_json,
    };
    if let Err(e) = logging::init(&log) {
        eprintln!("blockc: warning: logging disabled: {}", e);
    }

    let code = match cli.command {
        Command::Generate(args) => generate(args),
        Command::Kinds { json } => kinds(json),
        Command::Ports { arduino_cli, json } => ports(arduino_cli, json),
        Command::Serve(args) => serve(args),
    };
    std::process::exit(code);
}

// ── generate ──

fn generate(args: GenerateArgs) -> i32 {
    if args.verbose {
        eprintln!("blockc: source = {}", args.source.display());
        eprintln!("blockc: emit   = {:?}", args.emit);
    }

    let source = match read_source(&args.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("blockc: error: {}: {}", args.source.display(), e);
            return 2;
        }
    };

    let registry = Registry::esp32();
    let rules = RuleTable::esp32();
    if args.verbose {
        eprintln!(
            "blockc: {} block kinds registered, {} rules",
            registry.len(),
            rules.len()
        );
    }

    if let EmitStage::BuildInfo = args.emit {
        let provenance = compute_provenance(&source, &registry);
        return write_output(args.output.as_deref(), &provenance.to_json());
    }

    let loaded = match load_workspace(&source, &registry) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("blockc: error: {}: {}", args.source.display(), e);
            return 1;
        }
    };
    if args.verbose {
        eprintln!("blockc: loaded {} blocks", loaded.workspace.len());
    }

    let options = GeneratorOptions {
        button_policy: if args.button_active_low {
            ButtonPolicy::ActiveLow
        } else {
            ButtonPolicy::Raw
        },
    };
    let result = Assembler::new(&rules, options)
        .verbose(args.verbose)
        .run(&loaded.workspace, |_, _| {});
    let mut diagnostics = loaded.diagnostics;
    diagnostics.extend(result.diagnostics);

    match args.emit {
        EmitStage::Diagnostics => match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => write_output(args.output.as_deref(), &format!("{}\n", json)),
            Err(e) => {
                eprintln!("blockc: error: {}", e);
                1
            }
        },
        EmitStage::Sketch | EmitStage::BuildInfo => {
            for diag in &diagnostics {
                eprintln!("blockc: {}", diag);
            }
            write_output(args.output.as_deref(), &result.code)
        }
    }
}

fn read_source(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
    }
}

fn write_output(path: Option<&Path>, text: &str) -> i32 {
    let written = match path {
        Some(path) => std::fs::write(path, text).map_err(|e| (path.display().to_string(), e)),
        None => std::io::stdout()
            .write_all(text.as_bytes())
            .map_err(|e| ("<stdout>".to_string(), e)),
    };
    match written {
        Ok(()) => 0,
        Err((target, e)) => {
            eprintln!("blockc: error: {}: {}", target, e);
            2
        }
    }
}

// ── kinds ──

fn kinds(json: bool) -> i32 {
    let registry = Registry::esp32();
    if json {
        println!("{}", registry.canonical_json());
        return 0;
    }
    for shape in registry.shapes() {
        if shape.tooltip.is_empty() {
            println!("{}", shape.kind);
        } else {
            println!("{:<28} {}", shape.kind, shape.tooltip);
        }
    }
    0
}

// ── ports / serve ──

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}

fn ports(arduino_cli: PathBuf, json: bool) -> i32 {
    let config = ServiceConfig {
        arduino_cli,
        ..ServiceConfig::default()
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("blockc: error: {}", e);
            return 2;
        }
    };
    let listing = rt.block_on(blockc::ports::PortCache::new(config.port_cache_ttl).list(&config));

    if json {
        match serde_json::to_string_pretty(&listing) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("blockc: error: {}", e);
                return 1;
            }
        }
    } else {
        if listing.fallback {
            eprintln!("blockc: no serial ports detected; listing common names");
        }
        for port in &listing.ports {
            println!("{}\t{}\t{}", port.path, port.manufacturer, port.description);
        }
    }
    0
}

fn serve(args: ServeArgs) -> i32 {
    let config = match ServiceConfig::from_args(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("blockc: error: {:#}", e);
            return 2;
        }
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("blockc: error: {}", e);
            return 2;
        }
    };
    match rt.block_on(blockc::server::run_server(config)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("blockc: error: {:#}", e);
            1
        }
    }
}
