// diag.rs — Unified diagnostics model
//
// Shared diagnostic type used by workspace loading, the generator core and
// the program assembler. Generation never fails on a diagnostic: warnings are
// collected next to the produced text and surfaced by the CLI and service.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::id::BlockId;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `W0100`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    /// A block kind has no emission rule; a placeholder was generated.
    pub const W0100: DiagCode = DiagCode("W0100");
    /// A resource is read or written but never configured.
    pub const W0101: DiagCode = DiagCode("W0101");
    /// Top-level statements were dropped because a loop container exists.
    pub const W0102: DiagCode = DiagCode("W0102");
    /// A statement block sits in a value socket.
    pub const W0103: DiagCode = DiagCode("W0103");
    /// A link to or from a container block was severed while loading.
    pub const W0104: DiagCode = DiagCode("W0104");
    /// A value socket's type constraint does not accept the attached block.
    pub const W0105: DiagCode = DiagCode("W0105");
    /// A variable field references an unknown variable id.
    pub const W0106: DiagCode = DiagCode("W0106");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted while loading or generating.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    /// Block the diagnostic is about, when there is one.
    pub block: Option<BlockId>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_blocks: Vec<BlockId>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint or related blocks.
    pub fn new(level: DiagLevel, block: Option<BlockId>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            block,
            message: message.into(),
            hint: None,
            related_blocks: Vec::new(),
        }
    }

    pub fn warning(block: Option<BlockId>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, block, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related block.
    pub fn with_related(mut self, block: BlockId) -> Self {
        self.related_blocks.push(block);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, None, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_hint() {
        let d = Diagnostic::warning(Some(BlockId(3)), "pin 5 is never configured")
            .with_code(codes::W0101)
            .with_hint("add a pinMode block");
        assert_eq!(
            format!("{d}"),
            "warning[W0101]: pin 5 is never configured\n  hint: add a pinMode block"
        );
    }

    #[test]
    fn serializes_compactly() {
        let d = Diagnostic::warning(Some(BlockId(7)), "unknown").with_code(codes::W0100);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["code"], "W0100");
        assert_eq!(json["level"], "warning");
        assert_eq!(json["block"], 7);
        assert!(json.get("hint").is_none());
        assert!(json.get("related_blocks").is_none());
        assert!(!has_errors(&[d]));
    }
}
