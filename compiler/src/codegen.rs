// codegen.rs — Arduino C code generation core
//
// Walks a block graph and turns it into sketch text. The core owns the
// generation session (pending setup lines, used resources, the name table,
// container accumulators), dispatches every block to the rule registered for
// its kind, chains statement successors, and assembles the final sketch.
//
// Preconditions: `begin_session` was called before the first `emit`.
// Postconditions: `finish` returns a complete sketch with both sections.
// Failure modes: none; unknown kinds and empty sockets degrade to
//                placeholders and fallback literals, with diagnostics.
// Side effects: `tracing::warn!` for unknown kinds and misplaced statements.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::block::{Block, Workspace};
use crate::diag::{codes, Diagnostic};
use crate::id::BlockId;
use crate::names::NameTable;

pub const INDENT: &str = "  ";
pub const HEADER: &str = "// Generated by ESP32 Blockly IDE\n// Edit at your own risk!\n";
const SETUP_PLACEHOLDER: &str = "  // Initialize your hardware here\n";
const LOOP_PLACEHOLDER: &str = "  // Your main code goes here\n";
/// Remaining stack below which `emit` switches to a fresh segment.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;

// ── Precedence ──────────────────────────────────────────────────────────────

/// Binding strength of an expression; lower binds tighter. Values follow C
/// operator precedence scaled by ten so sub-levels stay integral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Order(pub u16);

impl Order {
    pub const ATOMIC: Order = Order(0);
    pub const MEMBER: Order = Order(12);
    pub const FUNCTION_CALL: Order = Order(20);
    pub const UNARY_MINUS: Order = Order(43);
    pub const LOGICAL_NOT: Order = Order(44);
    pub const MULTIPLICATION: Order = Order(51);
    pub const DIVISION: Order = Order(52);
    pub const MODULUS: Order = Order(53);
    pub const SUBTRACTION: Order = Order(61);
    pub const ADDITION: Order = Order(62);
    pub const RELATIONAL: Order = Order(80);
    pub const EQUALITY: Order = Order(90);
    pub const LOGICAL_AND: Order = Order(130);
    pub const LOGICAL_OR: Order = Order(140);
    pub const CONDITIONAL: Order = Order(150);
    pub const ASSIGNMENT: Order = Order(160);
    pub const COMMA: Order = Order(180);
    pub const NONE: Order = Order(990);
}

/// `(outer, inner)` pairs that never need parentheses although the inner
/// expression binds as loosely as the outer one.
const ORDER_OVERRIDES: &[(Order, Order)] = &[
    // a(b)(c), a.b.c, a.b(), a()[b]
    (Order::FUNCTION_CALL, Order::MEMBER),
    (Order::FUNCTION_CALL, Order::FUNCTION_CALL),
    (Order::MEMBER, Order::MEMBER),
    (Order::MEMBER, Order::FUNCTION_CALL),
    // !!x
    (Order::LOGICAL_NOT, Order::LOGICAL_NOT),
    // a * (b * c)
    (Order::MULTIPLICATION, Order::MULTIPLICATION),
    // a + (b + c)
    (Order::ADDITION, Order::ADDITION),
    (Order::LOGICAL_AND, Order::LOGICAL_AND),
    (Order::LOGICAL_OR, Order::LOGICAL_OR),
];

/// Whether an expression of `inner` order needs parentheses where at least
/// `outer` binding is required.
pub fn needs_parens(outer: Order, inner: Order) -> bool {
    if inner < outer {
        return false;
    }
    if inner == outer && (outer == Order::ATOMIC || outer == Order::NONE) {
        return false;
    }
    !ORDER_OVERRIDES.contains(&(outer, inner))
}

// ── Emission results ────────────────────────────────────────────────────────

/// What a rule produced for one block.
#[derive(Debug, Clone, PartialEq)]
pub enum Emitted {
    Statement(String),
    Expression(String, Order),
}

impl Emitted {
    pub fn empty() -> Self {
        Emitted::Statement(String::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Emitted::Statement(s) | Emitted::Expression(s, _) => s.is_empty(),
        }
    }

    /// Statement text; a naked value becomes an expression statement.
    pub fn into_statement(self) -> String {
        match self {
            Emitted::Statement(s) => s,
            Emitted::Expression(s, _) if s.is_empty() => s,
            Emitted::Expression(s, _) => format!("{};\n", s),
        }
    }
}

/// A resolved value socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub code: String,
    pub order: Order,
    /// Binds looser than the caller asked for.
    pub parenthesize: bool,
    /// The socket was empty and `code` is the fallback literal.
    pub fallback: bool,
}

impl Operand {
    pub fn wrapped(&self) -> String {
        if self.parenthesize {
            format!("({})", self.code)
        } else {
            self.code.clone()
        }
    }

    pub fn into_wrapped(self) -> String {
        if self.parenthesize {
            format!("({})", self.code)
        } else {
            self.code
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

/// Hardware resource that needs a setup line before use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Resource {
    Pin(String),
    Serial,
}

impl Resource {
    /// Key of the setup line that configures this resource.
    pub fn setup_key(&self) -> String {
        match self {
            Resource::Pin(p) => format!("pin_{}", p),
            Resource::Serial => "serial".to_string(),
        }
    }

    fn remedy(&self) -> &'static str {
        match self {
            Resource::Pin(_) => "add a pinMode block for it",
            Resource::Serial => "add a Serial begin block",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Pin(p) => write!(f, "pin {}", p),
            Resource::Serial => write!(f, "Serial"),
        }
    }
}

/// Keyed lines: last write per key wins, output in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct KeyedLines {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl KeyedLines {
    /// Set `key` to `line`, returning the line it replaced.
    pub fn insert(&mut self, key: impl Into<String>, line: impl Into<String>) -> Option<String> {
        let key = key.into();
        let line = line.into();
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, line)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, line));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, l)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State of one generation run.
#[derive(Debug, Default)]
pub struct Session {
    pub setup_lines: KeyedLines,
    pub definitions: KeyedLines,
    /// First-use order.
    pub used: Vec<Resource>,
    pub user_init: String,
    pub user_loop: String,
    pub names: NameTable,
    pub diagnostics: Vec<Diagnostic>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_used(&mut self, resource: Resource) {
        if !self.used.contains(&resource) {
            self.used.push(resource);
        }
    }

    pub fn configure(&mut self, resource: &Resource, line: impl Into<String>) {
        self.setup_lines.insert(resource.setup_key(), line);
    }

    /// Identifier for a user variable, declaring it on first use.
    pub fn variable(&mut self, user: &str) -> String {
        let name = self.names.get(user);
        let key = format!("var_{}", name);
        if !self.definitions.contains_key(&key) {
            self.definitions.insert(key, format!("double {} = 0;", name));
        }
        name
    }

    /// Resources used without a matching setup line, in first-use order.
    pub fn unconfigured(&self) -> Vec<&Resource> {
        self.used
            .iter()
            .filter(|r| !self.setup_lines.contains_key(&r.setup_key()))
            .collect()
    }
}

// ── Rule dispatch ───────────────────────────────────────────────────────────

/// Per-kind emission rule.
pub trait EmitRule: Send + Sync {
    fn emit(&self, g: &mut Generator<'_>, block: &Block) -> Emitted;
}

impl<F> EmitRule for F
where
    F: Fn(&mut Generator<'_>, &Block) -> Emitted + Send + Sync,
{
    fn emit(&self, g: &mut Generator<'_>, block: &Block) -> Emitted {
        self(g, block)
    }
}

/// Kind name → emission rule.
#[derive(Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Arc<dyn EmitRule>>,
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ESP32 rule set.
    pub fn esp32() -> Self {
        let mut table = RuleTable::new();
        crate::rules::install(&mut table);
        table
    }

    /// Register a rule; returns true when it replaced an existing one.
    pub fn register(&mut self, kind: &str, rule: impl EmitRule + 'static) -> bool {
        self.rules.insert(kind.to_string(), Arc::new(rule)).is_some()
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn EmitRule>> {
        self.rules.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.rules.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ── Generator options ───────────────────────────────────────────────────────

/// How a button read maps to "pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonPolicy {
    /// `digitalRead(P)` as is.
    #[default]
    Raw,
    /// `!digitalRead(P)`, for buttons wired to ground with a pull-up.
    ActiveLow,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratorOptions {
    pub button_policy: ButtonPolicy,
}

// ── Generator ───────────────────────────────────────────────────────────────

pub struct Generator<'w> {
    workspace: &'w Workspace,
    rules: &'w RuleTable,
    options: GeneratorOptions,
    session: Session,
}

impl<'w> Generator<'w> {
    pub fn new(workspace: &'w Workspace, rules: &'w RuleTable, options: GeneratorOptions) -> Self {
        Generator {
            workspace,
            rules,
            options,
            session: Session::new(),
        }
    }

    /// Drop everything accumulated by a previous run.
    pub fn begin_session(&mut self) {
        self.session = Session::new();
    }

    pub fn workspace(&self) -> &'w Workspace {
        self.workspace
    }

    pub fn block(&self, id: BlockId) -> &'w Block {
        self.workspace.block(id)
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Emit one block. Statement results carry their successors.
    pub fn emit(&mut self, id: Option<BlockId>) -> Emitted {
        let Some(block) = self.enabled(id) else {
            return Emitted::empty();
        };
        // Sockets nest through the rules; chains do not (see `chain`).
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || match self.emit_own(block) {
            Emitted::Statement(code) => Emitted::Statement(self.chain(block, code)),
            expr => expr,
        })
    }

    /// Append the emission of `block`'s successors to `code`. The chain ends
    /// at its last block, at a disabled block, or after a naked value block.
    pub fn chain(&mut self, block: &Block, mut code: String) -> String {
        let mut next = block.next;
        while let Some(successor) = self.enabled(next) {
            match self.emit_own(successor) {
                Emitted::Statement(text) => code.push_str(&text),
                value => {
                    code.push_str(&value.into_statement());
                    break;
                }
            }
            next = successor.next;
        }
        code
    }

    fn enabled(&self, id: Option<BlockId>) -> Option<&'w Block> {
        let workspace: &'w Workspace = self.workspace;
        let block = workspace.block(id?);
        (!block.disabled).then_some(block)
    }

    /// The block's own text, without its successors.
    fn emit_own(&mut self, block: &'w Block) -> Emitted {
        let rules: &'w RuleTable = self.rules;
        match rules.get(&block.kind) {
            Some(rule) => rule.emit(self, block),
            None => self.placeholder(block),
        }
    }

    fn placeholder(&mut self, block: &Block) -> Emitted {
        let text = format!("block kind not implemented: {}", block.kind);
        tracing::warn!(kind = %block.kind, block = block.id.0, "no emission rule for block kind");
        self.session.diagnostics.push(
            Diagnostic::warning(Some(block.id), text.clone())
                .with_code(codes::W0100)
                .with_hint("register an emission rule for this kind"),
        );
        if self.workspace.in_value_position(block.id) {
            Emitted::Expression(format!("/* {} */ 0", text), Order::ATOMIC)
        } else {
            Emitted::Statement(format!("// {}\n", text))
        }
    }

    /// Resolve value socket `socket` of `block`. Empty sockets yield
    /// `fallback` (or `0` when the fallback itself is empty).
    pub fn emit_value(&mut self, block: &Block, socket: &str, min: Order, fallback: &str) -> Operand {
        let fallback_operand = || Operand {
            code: if fallback.is_empty() { "0" } else { fallback }.to_string(),
            order: Order::ATOMIC,
            parenthesize: false,
            fallback: true,
        };
        let Some(child) = block.value_input(socket) else {
            return fallback_operand();
        };
        match self.emit(Some(child)) {
            Emitted::Expression(code, order) if !code.is_empty() => Operand {
                parenthesize: needs_parens(min, order),
                code,
                order,
                fallback: false,
            },
            Emitted::Statement(code) if !code.is_empty() => {
                let kind = &self.workspace.block(child).kind;
                tracing::warn!(kind = %kind, socket, "statement block in a value socket");
                self.session.diagnostics.push(
                    Diagnostic::warning(
                        Some(child),
                        format!(
                            "statement block '{}' cannot supply value socket '{}'",
                            kind, socket
                        ),
                    )
                    .with_code(codes::W0103)
                    .with_related(block.id),
                );
                fallback_operand()
            }
            _ => fallback_operand(),
        }
    }

    /// Whether value socket `socket` holds an enabled block.
    pub fn has_value(&self, block: &Block, socket: &str) -> bool {
        block
            .value_input(socket)
            .is_some_and(|id| !self.workspace.block(id).disabled)
    }

    /// Statement socket text, unindented.
    pub fn statement_body(&mut self, block: &Block, socket: &str) -> String {
        self.emit(block.statement_input(socket)).into_statement()
    }

    /// Statement socket text, indented one level.
    pub fn emit_statements(&mut self, block: &Block, socket: &str) -> String {
        indent(&self.statement_body(block, socket))
    }

    /// Assemble the sketch. `top_level` is the text of all non-container
    /// roots; it becomes the loop body unless a loop container supplied one.
    pub fn finish(&mut self, top_level: &str) -> String {
        let mut out = String::with_capacity(256 + top_level.len());
        out.push_str(HEADER);
        out.push('\n');

        let missing: Vec<Resource> = self.session.unconfigured().into_iter().cloned().collect();
        if !missing.is_empty() {
            for resource in &missing {
                let _ = writeln!(
                    out,
                    "// WARNING: {} is used but never configured; {}.",
                    resource,
                    resource.remedy()
                );
                self.session.diagnostics.push(
                    Diagnostic::warning(None, format!("{} is used but never configured", resource))
                        .with_code(codes::W0101)
                        .with_hint(resource.remedy()),
                );
            }
            out.push('\n');
        }

        if !self.session.definitions.is_empty() {
            for line in self.session.definitions.lines() {
                let _ = writeln!(out, "{}", line);
            }
            out.push('\n');
        }

        out.push_str("void setup() {\n");
        let init = &self.session.user_init;
        if self.session.setup_lines.is_empty() && init.trim().is_empty() {
            out.push_str(SETUP_PLACEHOLDER);
        } else {
            for line in self.session.setup_lines.lines() {
                let _ = writeln!(out, "{}{}", INDENT, line);
            }
            push_block(&mut out, &indent(init));
        }
        out.push_str("}\n\n");

        out.push_str("void loop() {\n");
        let body = if self.session.user_loop.trim().is_empty() {
            top_level
        } else {
            self.session.user_loop.as_str()
        };
        if body.trim().is_empty() {
            out.push_str(LOOP_PLACEHOLDER);
        } else {
            push_block(&mut out, &indent(body));
        }
        out.push_str("}\n");
        out
    }
}

/// Indent every non-blank line by one level.
pub fn indent(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + code.len() / 8);
    for line in code.split_inclusive('\n') {
        if !line.trim().is_empty() {
            out.push_str(INDENT);
        }
        out.push_str(line);
    }
    out
}

fn push_block(out: &mut String, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}
