// registry.rs — Block shape registry
//
// Declarative catalogue of block kinds: which fields a kind carries (with
// defaults, dropdown options and edit-time validators), which value and
// statement sockets it exposes, whether it produces a value, and whether it
// may be chained. The generator never consults shapes; the workspace loader
// and the `/kinds` endpoint do.
//
// Preconditions: none.
// Postconditions: every registered shape passed `check_shape`.
// Failure modes: malformed shapes are refused with `RegistryError`.
// Side effects: `tracing::debug!` when a kind is redefined.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::block::{Block, FieldValue};
use crate::validate::Validator;

// ── Data types ──────────────────────────────────────────────────────────────

/// Type constraint on a value socket or a value kind's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueCheck {
    Boolean,
    Number,
    String,
}

/// One dropdown entry: what the user sees and what the field stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropdownOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub default: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<DropdownOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<Validator>,
}

impl FieldSpec {
    /// Free-text field without a validator.
    pub fn text(name: &str, default: &str) -> Self {
        FieldSpec {
            name: name.to_string(),
            default: default.to_string(),
            options: Vec::new(),
            validator: None,
        }
    }

    pub fn validated(name: &str, default: &str, validator: Validator) -> Self {
        FieldSpec {
            validator: Some(validator),
            ..FieldSpec::text(name, default)
        }
    }

    /// Dropdown whose label equals its value. The first option is the default.
    pub fn dropdown(name: &str, values: &[&str]) -> Self {
        let pairs: Vec<(&str, &str)> = values.iter().map(|v| (*v, *v)).collect();
        FieldSpec::labelled_dropdown(name, &pairs)
    }

    /// Dropdown with distinct labels and values, as `(label, value)` pairs.
    pub fn labelled_dropdown(name: &str, pairs: &[(&str, &str)]) -> Self {
        let options: Vec<DropdownOption> = pairs
            .iter()
            .map(|(label, value)| DropdownOption {
                label: label.to_string(),
                value: value.to_string(),
            })
            .collect();
        FieldSpec {
            name: name.to_string(),
            default: options.first().map(|o| o.value.clone()).unwrap_or_default(),
            validator: Some(Validator::one_of(options.iter().map(|o| o.value.clone()))),
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueSocket {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<ValueCheck>,
}

/// Which kind of socket an input name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Value,
    Statement,
}

/// Mutator-grown sockets: every `<prefix><n>` input is of `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepeatingSocket {
    pub prefix: String,
    pub kind: InputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<ValueCheck>,
}

/// Output connector of a value kind. `check: None` plugs in anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Output {
    pub check: Option<ValueCheck>,
}

/// Declarative shape of one block kind.
#[derive(Debug, Clone, Serialize)]
pub struct BlockShape {
    pub kind: String,
    pub tooltip: String,
    pub fields: Vec<FieldSpec>,
    pub value_inputs: Vec<ValueSocket>,
    pub statement_inputs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repeating: Vec<RepeatingSocket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    pub previous: bool,
    pub next: bool,
}

impl BlockShape {
    fn bare(kind: &str) -> Self {
        BlockShape {
            kind: kind.to_string(),
            tooltip: String::new(),
            fields: Vec::new(),
            value_inputs: Vec::new(),
            statement_inputs: Vec::new(),
            repeating: Vec::new(),
            output: None,
            previous: false,
            next: false,
        }
    }

    /// Chainable statement kind.
    pub fn statement(kind: &str) -> Self {
        BlockShape {
            previous: true,
            next: true,
            ..BlockShape::bare(kind)
        }
    }

    /// Value kind producing an expression of type `check`.
    pub fn value(kind: &str, check: Option<ValueCheck>) -> Self {
        BlockShape {
            output: Some(Output { check }),
            ..BlockShape::bare(kind)
        }
    }

    /// Top-level container: no predecessor, no successor.
    pub fn container(kind: &str) -> Self {
        BlockShape::bare(kind)
    }

    pub fn tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = tooltip.to_string();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn value_input(mut self, name: &str, check: Option<ValueCheck>) -> Self {
        self.value_inputs.push(ValueSocket {
            name: name.to_string(),
            check,
        });
        self
    }

    pub fn statement_input(mut self, name: &str) -> Self {
        self.statement_inputs.push(name.to_string());
        self
    }

    pub fn repeating(mut self, prefix: &str, kind: InputKind, check: Option<ValueCheck>) -> Self {
        self.repeating.push(RepeatingSocket {
            prefix: prefix.to_string(),
            kind,
            check,
        });
        self
    }

    pub fn is_value_kind(&self) -> bool {
        self.output.is_some()
    }

    pub fn is_container(&self) -> bool {
        self.output.is_none() && !self.previous && !self.next
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Classify an input name, including mutator-grown `<prefix><n>` names.
    pub fn input_kind(&self, name: &str) -> Option<InputKind> {
        if self.value_inputs.iter().any(|s| s.name == name) {
            return Some(InputKind::Value);
        }
        if self.statement_inputs.iter().any(|s| s == name) {
            return Some(InputKind::Statement);
        }
        self.repeating_for(name).map(|r| r.kind)
    }

    /// Type constraint of a value socket, if it declares one.
    pub fn socket_check(&self, name: &str) -> Option<ValueCheck> {
        if let Some(s) = self.value_inputs.iter().find(|s| s.name == name) {
            return s.check;
        }
        self.repeating_for(name)
            .filter(|r| r.kind == InputKind::Value)
            .and_then(|r| r.check)
    }

    fn repeating_for(&self, name: &str) -> Option<&RepeatingSocket> {
        self.repeating.iter().find(|r| {
            name.strip_prefix(r.prefix.as_str())
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid shape for block kind '{kind}': {message}")]
    InvalidShape { kind: String, message: String },
}

fn check_shape(shape: &BlockShape) -> Result<(), RegistryError> {
    let invalid = |message: String| RegistryError::InvalidShape {
        kind: shape.kind.clone(),
        message,
    };
    if shape.kind.trim().is_empty() {
        return Err(invalid("kind name is empty".to_string()));
    }
    if shape.output.is_some() && (shape.previous || shape.next) {
        return Err(invalid(
            "a value kind cannot also chain as a statement".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let names = shape
        .value_inputs
        .iter()
        .map(|s| s.name.as_str())
        .chain(shape.statement_inputs.iter().map(String::as_str));
    for name in names {
        if !seen.insert(name) {
            return Err(invalid(format!("socket '{}' declared twice", name)));
        }
    }
    let mut fields = HashSet::new();
    for f in &shape.fields {
        if !fields.insert(f.name.as_str()) {
            return Err(invalid(format!("field '{}' declared twice", f.name)));
        }
    }
    Ok(())
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Block shape registry keyed by kind name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    shapes: HashMap<String, BlockShape>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. Redefinition replaces the old shape and returns it.
    pub fn define(&mut self, shape: BlockShape) -> Result<Option<BlockShape>, RegistryError> {
        check_shape(&shape)?;
        let previous = self.shapes.insert(shape.kind.clone(), shape);
        if let Some(old) = &previous {
            tracing::debug!(kind = %old.kind, "block kind redefined");
        }
        Ok(previous)
    }

    pub fn lookup(&self, kind: &str) -> Option<&BlockShape> {
        self.shapes.get(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.shapes.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Shapes sorted by kind name.
    pub fn shapes(&self) -> Vec<&BlockShape> {
        let mut shapes: Vec<&BlockShape> = self.shapes.values().collect();
        shapes.sort_by(|a, b| a.kind.cmp(&b.kind));
        shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Compact JSON of every shape, sorted by kind. Stable across runs.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.shapes()).unwrap_or_else(|_| "[]".to_string())
    }

    /// A fresh block of `kind` with every field at its default.
    pub fn instantiate(&self, kind: &str) -> Option<Block> {
        let shape = self.lookup(kind)?;
        let mut block = Block::new(kind);
        for f in &shape.fields {
            block
                .fields
                .insert(f.name.clone(), FieldValue::Text(f.default.clone()));
        }
        Some(block)
    }

    /// Whether `child_kind` may plug into value socket `socket` of
    /// `parent_kind`. Unknown kinds and unconstrained sockets accept anything.
    pub fn accepts(&self, parent_kind: &str, socket: &str, child_kind: &str) -> bool {
        let Some(wanted) = self
            .lookup(parent_kind)
            .and_then(|p| p.socket_check(socket))
        else {
            return true;
        };
        match self.lookup(child_kind).and_then(|c| c.output) {
            Some(Output { check: Some(given) }) => given == wanted,
            _ => true,
        }
    }

    /// The ESP32 catalogue shipped with the editor.
    pub fn esp32() -> Self {
        let mut registry = Registry::new();
        for shape in esp32_shapes() {
            // Catalogue shapes are well-formed; `define` only fails on
            // malformed input.
            if let Err(e) = registry.define(shape) {
                tracing::error!("{}", e);
            }
        }
        registry
    }
}

// ── ESP32 catalogue ─────────────────────────────────────────────────────────

const PIN_MODES: &[&str] = &["OUTPUT", "INPUT", "INPUT_PULLUP", "INPUT_PULLDOWN"];
const BAUD_RATES: &[&str] = &["115200", "9600", "57600", "38400", "19200", "4800", "2400"];

fn gpio_pin(default: &str) -> FieldSpec {
    FieldSpec::validated("PIN", default, Validator::gpio())
}

fn millis_field(name: &str, default: &str) -> FieldSpec {
    FieldSpec::validated(name, default, Validator::non_negative())
}

fn high_low() -> FieldSpec {
    FieldSpec::dropdown("STATE", &["HIGH", "LOW"])
}

const BOOL: Option<ValueCheck> = Some(ValueCheck::Boolean);
const NUMBER: Option<ValueCheck> = Some(ValueCheck::Number);

fn esp32_shapes() -> Vec<BlockShape> {
    vec![
        // GPIO
        BlockShape::statement("esp32_pin_mode")
            .tooltip("Configure a GPIO pin direction/mode")
            .field(gpio_pin("2"))
            .field(FieldSpec::dropdown("MODE", PIN_MODES)),
        BlockShape::statement("esp32_digital_write")
            .tooltip("Set a GPIO pin to HIGH or LOW")
            .field(gpio_pin("2"))
            .field(high_low()),
        BlockShape::value("esp32_digital_read", BOOL)
            .tooltip("Read the digital state of a GPIO pin")
            .field(gpio_pin("2")),
        BlockShape::value("esp32_analog_read", NUMBER)
            .tooltip("Read the analog value from a pin (0-4095)")
            .field(FieldSpec::validated("PIN", "A0", Validator::analog_pin())),
        BlockShape::value("esp32_button_read", BOOL)
            .tooltip("Check if a button is pressed")
            .field(gpio_pin("0")),
        BlockShape::value("esp32_high_low", BOOL)
            .tooltip("HIGH or LOW constant value")
            .field(high_low()),
        // Relay
        BlockShape::statement("esp32_relay_set")
            .tooltip("ON / OFF relay (digitalWrite)")
            .field(gpio_pin("4"))
            .field(FieldSpec::labelled_dropdown(
                "STATE",
                &[("ON", "HIGH"), ("OFF", "LOW")],
            )),
        BlockShape::statement("esp32_relay_blink")
            .tooltip("Blink relay: HIGH then LOW with ON/OFF timing")
            .field(gpio_pin("4"))
            .field(millis_field("DELAY_ON", "1000"))
            .field(millis_field("DELAY_OFF", "1000")),
        // Time
        BlockShape::statement("esp32_delay_ms")
            .tooltip("Pause the program for the specified milliseconds")
            .field(millis_field("DELAY", "1000")),
        BlockShape::value("esp32_millis", NUMBER)
            .tooltip("Returns milliseconds since the program started"),
        // Serial
        BlockShape::statement("esp32_serial_begin")
            .tooltip("Initialize Serial with selected baud rate")
            .field(FieldSpec::dropdown("BAUD", BAUD_RATES)),
        BlockShape::statement("esp32_serial_print")
            .tooltip("Send data to Serial (no newline)")
            .value_input("TEXT", None),
        BlockShape::statement("esp32_serial_println")
            .tooltip("Send data to Serial and append newline")
            .value_input("TEXT", None),
        BlockShape::value("esp32_serial_available", NUMBER)
            .tooltip("Number of bytes available to read in buffer"),
        BlockShape::value("esp32_serial_read", NUMBER)
            .tooltip("Read one byte from Serial (return -1 if none)"),
        // Control
        BlockShape::statement("esp32_if")
            .tooltip("Execute code if condition is true")
            .value_input("CONDITION", BOOL)
            .statement_input("DO"),
        BlockShape::statement("esp32_if_else")
            .tooltip("Execute code if condition is true, otherwise execute else code")
            .value_input("CONDITION", BOOL)
            .statement_input("DO")
            .statement_input("ELSE"),
        BlockShape::statement("esp32_while")
            .tooltip("Repeat code while condition is true")
            .value_input("CONDITION", BOOL)
            .statement_input("DO"),
        BlockShape::statement("esp32_if_elseif")
            .tooltip("If-else if statement")
            .value_input("IF0", BOOL)
            .statement_input("DO0")
            .value_input("IF1", BOOL)
            .statement_input("DO1"),
        BlockShape::statement("esp32_if_elseif_else")
            .tooltip("If-else if-else statement")
            .value_input("IF0", BOOL)
            .statement_input("DO0")
            .value_input("IF1", BOOL)
            .statement_input("DO1")
            .statement_input("ELSE"),
        BlockShape::statement("esp32_if_multiple")
            .tooltip("If with multiple else if conditions and final else")
            .value_input("IF0", BOOL)
            .statement_input("DO0")
            .value_input("IF1", BOOL)
            .statement_input("DO1")
            .value_input("IF2", BOOL)
            .statement_input("DO2")
            .statement_input("ELSE"),
        BlockShape::statement("esp32_clear_if_else")
            .tooltip("If the condition is true do the first part, otherwise the second")
            .value_input("CONDITION", BOOL)
            .statement_input("IF_STATEMENTS")
            .statement_input("ELSE_STATEMENTS"),
        BlockShape::statement("esp32_simple_if_else")
            .tooltip("Do something if the condition is true, otherwise something else")
            .value_input("CONDITION", BOOL)
            .statement_input("IF_DO")
            .statement_input("ELSE_DO"),
        BlockShape::statement("controls_if")
            .tooltip("If a value is true, then do some statements")
            .repeating("IF", InputKind::Value, BOOL)
            .repeating("DO", InputKind::Statement, None)
            .statement_input("ELSE"),
        BlockShape::statement("controls_repeat_ext")
            .tooltip("Do some statements several times")
            .value_input("TIMES", NUMBER)
            .statement_input("DO"),
        BlockShape::statement("controls_repeat")
            .tooltip("Do some statements several times")
            .field(FieldSpec::validated("TIMES", "10", Validator::non_negative()))
            .statement_input("DO"),
        BlockShape::statement("controls_whileUntil")
            .tooltip("Repeat while (or until) a value is true")
            .field(FieldSpec::dropdown("MODE", &["WHILE", "UNTIL"]))
            .value_input("BOOL", BOOL)
            .statement_input("DO"),
        BlockShape {
            // Ends a chain: nothing may follow break/continue.
            next: false,
            ..BlockShape::statement("controls_flow_statements")
                .tooltip("Break out of, or continue, the containing loop")
                .field(FieldSpec::dropdown("FLOW", &["BREAK", "CONTINUE"]))
        },
        // Logic
        BlockShape::value("logic_compare", BOOL)
            .tooltip("Compare two values")
            .field(FieldSpec::dropdown("OP", &["EQ", "NEQ", "LT", "LTE", "GT", "GTE"]))
            .value_input("A", None)
            .value_input("B", None),
        BlockShape::value("logic_operation", BOOL)
            .tooltip("Both (and) or either (or) of two values")
            .field(FieldSpec::dropdown("OP", &["AND", "OR"]))
            .value_input("A", BOOL)
            .value_input("B", BOOL),
        BlockShape::value("logic_boolean", BOOL)
            .tooltip("Returns either true or false")
            .field(FieldSpec::labelled_dropdown(
                "BOOL",
                &[("true", "TRUE"), ("false", "FALSE")],
            )),
        BlockShape::value("logic_negate", BOOL)
            .tooltip("Returns true if the input is false")
            .value_input("BOOL", BOOL),
        // Math
        BlockShape::value("math_number", NUMBER)
            .tooltip("A number")
            .field(FieldSpec::text("NUM", "0")),
        BlockShape::value("math_arithmetic", NUMBER)
            .tooltip("Arithmetic on two numbers")
            .field(FieldSpec::dropdown(
                "OP",
                &["ADD", "MINUS", "MULTIPLY", "DIVIDE", "POWER"],
            ))
            .value_input("A", NUMBER)
            .value_input("B", NUMBER),
        // Variables
        BlockShape::value("variables_get", None)
            .tooltip("Returns the value of this variable")
            .field(FieldSpec::text("VAR", "item")),
        BlockShape::statement("variables_set")
            .tooltip("Sets this variable to be equal to the input")
            .field(FieldSpec::text("VAR", "item"))
            .value_input("VALUE", None),
        // Text
        BlockShape::value("text", None)
            .tooltip("Standard string literal (wrapped in quotes)")
            .field(FieldSpec::text("TEXT", "")),
        BlockShape::value("esp32_text_raw", None)
            .tooltip("Raw string/code (kept exactly, no quotes added)")
            .field(FieldSpec::text("RAW", "")),
        // Program structure
        BlockShape::container("program_setup")
            .tooltip("Statements run once at start-up")
            .statement_input("DO"),
        BlockShape::container("program_loop")
            .tooltip("Statements run repeatedly")
            .statement_input("DO"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_covers_every_family() {
        let r = Registry::esp32();
        for kind in [
            "esp32_pin_mode",
            "esp32_relay_blink",
            "esp32_serial_begin",
            "controls_if",
            "controls_whileUntil",
            "logic_negate",
            "math_arithmetic",
            "variables_set",
            "esp32_text_raw",
            "program_loop",
        ] {
            assert!(r.lookup(kind).is_some(), "missing {}", kind);
        }
        assert_eq!(r.len(), r.kinds().len());
    }

    #[test]
    fn redefinition_replaces_and_returns_previous() {
        let mut r = Registry::new();
        let first = BlockShape::statement("custom").field(FieldSpec::text("A", "1"));
        assert!(r.define(first).unwrap().is_none());
        let second = BlockShape::statement("custom").field(FieldSpec::text("B", "2"));
        let old = r.define(second).unwrap().unwrap();
        assert!(old.field_spec("A").is_some());
        let now = r.lookup("custom").unwrap();
        assert!(now.field_spec("A").is_none());
        assert!(now.field_spec("B").is_some());
    }

    #[test]
    fn malformed_shapes_are_refused() {
        let mut r = Registry::new();
        let both = BlockShape {
            previous: true,
            ..BlockShape::value("odd", None)
        };
        assert!(r.define(both).is_err());
        let dup = BlockShape::statement("dup")
            .value_input("X", None)
            .statement_input("X");
        let err = r.define(dup).unwrap_err();
        assert!(err.to_string().contains("'X' declared twice"), "got: {}", err);
        assert!(r.is_empty());
    }

    #[test]
    fn input_kinds_include_repeating_prefixes() {
        let r = Registry::esp32();
        let shape = r.lookup("controls_if").unwrap();
        assert_eq!(shape.input_kind("IF0"), Some(InputKind::Value));
        assert_eq!(shape.input_kind("IF7"), Some(InputKind::Value));
        assert_eq!(shape.input_kind("DO3"), Some(InputKind::Statement));
        assert_eq!(shape.input_kind("ELSE"), Some(InputKind::Statement));
        assert_eq!(shape.input_kind("IFX"), None);
        assert_eq!(shape.socket_check("IF2"), Some(ValueCheck::Boolean));
    }

    #[test]
    fn containers_do_not_chain() {
        let r = Registry::esp32();
        let setup = r.lookup("program_setup").unwrap();
        assert!(setup.is_container());
        assert!(!setup.previous && !setup.next);
        assert!(!r.lookup("esp32_delay_ms").unwrap().is_container());
    }

    #[test]
    fn boolean_sockets_refuse_numbers() {
        let r = Registry::esp32();
        assert!(r.accepts("esp32_if", "CONDITION", "logic_compare"));
        assert!(!r.accepts("esp32_if", "CONDITION", "math_number"));
        // Untyped outputs plug in anywhere.
        assert!(r.accepts("esp32_if", "CONDITION", "variables_get"));
        assert!(r.accepts("esp32_serial_print", "TEXT", "math_number"));
        assert!(r.accepts("mystery", "X", "math_number"));
    }

    #[test]
    fn instantiate_uses_defaults() {
        let r = Registry::esp32();
        let b = r.instantiate("esp32_relay_set").unwrap();
        assert_eq!(b.field_text("PIN"), "4");
        assert_eq!(b.field_text("STATE"), "HIGH");
        assert!(r.instantiate("mystery").is_none());
    }

    #[test]
    fn dropdown_edits_are_validated() {
        let r = Registry::esp32();
        let shape = r.lookup("esp32_pin_mode").unwrap();
        let mut block = r.instantiate("esp32_pin_mode").unwrap();
        let mode = shape.field_spec("MODE").unwrap();
        assert!(block.edit_field(mode, "SIDEWAYS").is_err());
        assert_eq!(block.field_text("MODE"), "OUTPUT");
        block.edit_field(mode, "INPUT_PULLUP").unwrap();
        assert_eq!(block.field_text("MODE"), "INPUT_PULLUP");

        let pin = shape.field_spec("PIN").unwrap();
        assert!(block.edit_field(pin, "41").is_err());
        assert_eq!(block.field_text("PIN"), "2");
    }

    #[test]
    fn canonical_json_is_sorted_and_stable() {
        let a = Registry::esp32().canonical_json();
        let b = Registry::esp32().canonical_json();
        assert_eq!(a, b);
        assert!(!a.contains('\n'));
        let first = a.find("\"controls_if\"").unwrap();
        let later = a.find("\"variables_set\"").unwrap();
        assert!(first < later);
    }
}
