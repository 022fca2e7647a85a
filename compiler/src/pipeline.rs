// pipeline.rs — Program assembly and generation orchestration
//
// Drives one generation run over a loaded workspace:
// Idle → CollectingTopLevel → Emitting → Assembled. Roots are ordered by
// canvas height, each is emitted through a fresh generator session, and the
// non-container text is handed to `finish` as the fallback loop body.
//
// Preconditions: the workspace was loaded (or built) against the same
//                catalogue the rule table implements.
// Postconditions: `GenerateResult.code` is a complete sketch.
// Failure modes: none at this level; loading can fail (`LoadError`).
// Side effects: calls `on_stage` after each stage; prints stage timings to
//               stderr when verbose.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::block::Workspace;
use crate::codegen::{Generator, GeneratorOptions, RuleTable};
use crate::diag::{codes, Diagnostic};
use crate::registry::Registry;
use crate::workspace::{load_value, load_workspace, LoadError, Loaded};

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds.
///
/// `source_hash`: SHA-256 of the raw workspace JSON.
/// `registry_fingerprint`: SHA-256 of `Registry::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the registry fingerprint (64 characters).
    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    /// JSON document printed by `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"registry_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.registry_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(data));
    hash
}

pub fn compute_provenance(source: &str, registry: &Registry) -> Provenance {
    Provenance {
        source_hash: sha256(source.as_bytes()),
        registry_fingerprint: sha256(registry.canonical_json().as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Stages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    CollectingTopLevel,
    Emitting,
    Assembled,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::CollectingTopLevel => "collect",
            Stage::Emitting => "emit",
            Stage::Assembled => "assemble",
        }
    }
}

/// Result of one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of top-level blocks walked.
    pub roots: usize,
}

// ── Assembler ──────────────────────────────────────────────────────────────

pub struct Assembler<'r> {
    rules: &'r RuleTable,
    options: GeneratorOptions,
    stage: Stage,
    verbose: bool,
}

impl<'r> Assembler<'r> {
    pub fn new(rules: &'r RuleTable, options: GeneratorOptions) -> Self {
        Assembler {
            rules,
            options,
            stage: Stage::Idle,
            verbose: false,
        }
    }

    /// Print `blockc: <stage> complete, <ms>ms` lines to stderr.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Generate a sketch for `workspace`, reporting every stage transition.
    pub fn run(
        &mut self,
        workspace: &Workspace,
        mut on_stage: impl FnMut(Stage, Duration),
    ) -> GenerateResult {
        self.stage = Stage::Idle;

        let t = Instant::now();
        let roots = workspace.sorted_roots();
        self.advance(Stage::CollectingTopLevel, t.elapsed(), &mut on_stage);

        let t = Instant::now();
        let mut generator = Generator::new(workspace, self.rules, self.options);
        generator.begin_session();
        let mut top_level = String::new();
        for &root in &roots {
            top_level.push_str(&generator.emit(Some(root)).into_statement());
        }
        self.advance(Stage::Emitting, t.elapsed(), &mut on_stage);

        let t = Instant::now();
        if !generator.session().user_loop.trim().is_empty() && !top_level.trim().is_empty() {
            tracing::warn!("top-level statements discarded in favour of the loop block");
            generator.session_mut().diagnostics.push(
                Diagnostic::warning(
                    None,
                    "statements outside the setup and loop blocks were not generated",
                )
                .with_code(codes::W0102)
                .with_hint("move them into the loop block"),
            );
        }
        let code = generator.finish(&top_level);
        let session = generator.into_session();
        self.advance(Stage::Assembled, t.elapsed(), &mut on_stage);

        GenerateResult {
            code,
            diagnostics: session.diagnostics,
            roots: roots.len(),
        }
    }

    fn advance(
        &mut self,
        stage: Stage,
        elapsed: Duration,
        on_stage: &mut impl FnMut(Stage, Duration),
    ) {
        self.stage = stage;
        on_stage(stage, elapsed);
        tracing::debug!(stage = stage.name(), elapsed_us = elapsed.as_micros() as u64, "stage complete");
        if self.verbose {
            eprintln!(
                "blockc: {} complete, {:.1}ms",
                stage.name(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }
}

// ── Entry points ───────────────────────────────────────────────────────────

/// Generate a sketch for an already-loaded workspace.
pub fn generate(workspace: &Workspace, rules: &RuleTable, options: GeneratorOptions) -> GenerateResult {
    Assembler::new(rules, options).run(workspace, |_, _| {})
}

/// Load workspace JSON and generate. Load-time repairs come first in the
/// returned diagnostics.
pub fn generate_source(
    source: &str,
    registry: &Registry,
    rules: &RuleTable,
    options: GeneratorOptions,
) -> Result<GenerateResult, LoadError> {
    let loaded = load_workspace(source, registry)?;
    Ok(generate_loaded(loaded, rules, options))
}

/// As `generate_source`, for a document already parsed into a JSON value.
pub fn generate_value(
    value: serde_json::Value,
    registry: &Registry,
    rules: &RuleTable,
    options: GeneratorOptions,
) -> Result<GenerateResult, LoadError> {
    let loaded = load_value(value, registry)?;
    Ok(generate_loaded(loaded, rules, options))
}

fn generate_loaded(loaded: Loaded, rules: &RuleTable, options: GeneratorOptions) -> GenerateResult {
    let mut result = generate(&loaded.workspace, rules, options);
    let mut diagnostics = loaded.diagnostics;
    diagnostics.append(&mut result.diagnostics);
    result.diagnostics = diagnostics;
    result
}
