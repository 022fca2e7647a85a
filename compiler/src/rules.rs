// rules.rs — Emission rules for the ESP32 block catalogue
//
// One function per block kind, registered into a `RuleTable` by `install`.
// Statement rules return unchained text (the core appends successors);
// value rules return an expression with its precedence.
//
// Preconditions: field values were validated at edit time.
// Postconditions: every rule returns non-empty expression text.
// Failure modes: none.
// Side effects: rules record setup lines and used resources in the session.

use std::fmt::Write as _;

use crate::block::{format_number, Block};
use crate::codegen::{ButtonPolicy, Emitted, Generator, Order, Resource, RuleTable};

/// Upper bound on mutator-grown `else if` branches.
const MAX_ELSE_IF: usize = 256;

pub fn install(table: &mut RuleTable) {
    // GPIO
    table.register("esp32_pin_mode", pin_mode);
    table.register("esp32_digital_write", digital_write);
    table.register("esp32_digital_read", digital_read);
    table.register("esp32_analog_read", analog_read);
    table.register("esp32_button_read", button_read);
    table.register("esp32_high_low", high_low);
    // Relay
    table.register("esp32_relay_set", digital_write);
    table.register("esp32_relay_blink", relay_blink);
    // Time
    table.register("esp32_delay_ms", delay_ms);
    table.register("esp32_millis", millis);
    // Serial
    table.register("esp32_serial_begin", serial_begin);
    table.register("esp32_serial_print", serial_print);
    table.register("esp32_serial_println", serial_println);
    table.register("esp32_serial_available", serial_available);
    table.register("esp32_serial_read", serial_read);
    // Control
    table.register("esp32_if", esp32_if);
    table.register("esp32_if_else", esp32_if_else);
    table.register("esp32_while", esp32_while);
    table.register("esp32_if_elseif", if_elseif);
    table.register("esp32_if_elseif_else", if_elseif_else);
    table.register("esp32_if_multiple", if_multiple);
    table.register("esp32_clear_if_else", clear_if_else);
    table.register("esp32_simple_if_else", simple_if_else);
    table.register("controls_if", controls_if);
    table.register("controls_repeat_ext", repeat_ext);
    table.register("controls_repeat", repeat_fixed);
    table.register("controls_whileUntil", while_until);
    table.register("controls_flow_statements", flow_statement);
    // Logic
    table.register("logic_compare", logic_compare);
    table.register("logic_operation", logic_operation);
    table.register("logic_boolean", logic_boolean);
    table.register("logic_negate", logic_negate);
    // Math
    table.register("math_number", math_number);
    table.register("math_arithmetic", math_arithmetic);
    // Variables
    table.register("variables_get", variables_get);
    table.register("variables_set", variables_set);
    // Text
    table.register("text", text);
    table.register("esp32_text_raw", text_raw);
    // Program structure
    table.register("program_setup", program_setup);
    table.register("program_loop", program_loop);
}

// ── GPIO ────────────────────────────────────────────────────────────────────

fn pin_mode(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let pin = block.field_text("PIN");
    let mode = block.field_text("MODE");
    g.session_mut().configure(
        &Resource::Pin(pin.to_string()),
        format!("pinMode({}, {});", pin, mode),
    );
    Emitted::empty()
}

/// Also serves `esp32_relay_set`: both store HIGH/LOW in `STATE`.
fn digital_write(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let pin = block.field_text("PIN");
    g.session_mut().mark_used(Resource::Pin(pin.to_string()));
    Emitted::Statement(format!(
        "digitalWrite({}, {});\n",
        pin,
        block.field_text("STATE")
    ))
}

fn digital_read(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let pin = block.field_text("PIN");
    g.session_mut().mark_used(Resource::Pin(pin.to_string()));
    Emitted::Expression(format!("digitalRead({})", pin), Order::FUNCTION_CALL)
}

// Analog inputs need no pinMode, so the pin is not marked used.
fn analog_read(_: &mut Generator<'_>, block: &Block) -> Emitted {
    Emitted::Expression(
        format!("analogRead({})", block.field_text("PIN")),
        Order::FUNCTION_CALL,
    )
}

fn button_read(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let pin = block.field_text("PIN");
    g.session_mut().mark_used(Resource::Pin(pin.to_string()));
    match g.options().button_policy {
        ButtonPolicy::Raw => {
            Emitted::Expression(format!("digitalRead({})", pin), Order::FUNCTION_CALL)
        }
        ButtonPolicy::ActiveLow => {
            Emitted::Expression(format!("!digitalRead({})", pin), Order::LOGICAL_NOT)
        }
    }
}

fn high_low(_: &mut Generator<'_>, block: &Block) -> Emitted {
    let state = if block.field_text("STATE") == "LOW" {
        "LOW"
    } else {
        "HIGH"
    };
    Emitted::Expression(state.to_string(), Order::ATOMIC)
}

// ── Relay ───────────────────────────────────────────────────────────────────

fn relay_blink(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let pin = block.field_text("PIN");
    g.session_mut().mark_used(Resource::Pin(pin.to_string()));
    let mut code = String::new();
    if !follows_high_write(g, block, &pin) {
        let _ = writeln!(code, "digitalWrite({}, HIGH);", pin);
    }
    let _ = writeln!(code, "delay({});", block.field_text("DELAY_ON"));
    let _ = writeln!(code, "digitalWrite({}, LOW);", pin);
    let _ = writeln!(code, "delay({});", block.field_text("DELAY_OFF"));
    Emitted::Statement(code)
}

/// The immediate chain predecessor already drove `pin` HIGH.
fn follows_high_write(g: &Generator<'_>, block: &Block, pin: &str) -> bool {
    let Some(prev) = g.workspace().previous(block.id) else {
        return false;
    };
    let prev = g.block(prev);
    !prev.disabled
        && matches!(
            prev.kind.as_str(),
            "esp32_digital_write" | "esp32_relay_set"
        )
        && prev.field_text("PIN") == pin
        && prev.field_text("STATE") == "HIGH"
}

// ── Time ────────────────────────────────────────────────────────────────────

fn delay_ms(_: &mut Generator<'_>, block: &Block) -> Emitted {
    Emitted::Statement(format!("delay({});\n", block.field_text("DELAY")))
}

fn millis(_: &mut Generator<'_>, _: &Block) -> Emitted {
    Emitted::Expression("millis()".to_string(), Order::FUNCTION_CALL)
}

// ── Serial ──────────────────────────────────────────────────────────────────

fn serial_begin(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let baud = block.field_text("BAUD");
    g.session_mut()
        .configure(&Resource::Serial, format!("Serial.begin({});", baud));
    Emitted::empty()
}

fn serial_output(g: &mut Generator<'_>, block: &Block, method: &str) -> Emitted {
    g.session_mut().mark_used(Resource::Serial);
    let arg = g.emit_value(block, "TEXT", Order::NONE, "\"\"");
    Emitted::Statement(format!("Serial.{}({});\n", method, arg.into_wrapped()))
}

fn serial_print(g: &mut Generator<'_>, block: &Block) -> Emitted {
    serial_output(g, block, "print")
}

fn serial_println(g: &mut Generator<'_>, block: &Block) -> Emitted {
    serial_output(g, block, "println")
}

fn serial_available(g: &mut Generator<'_>, _: &Block) -> Emitted {
    g.session_mut().mark_used(Resource::Serial);
    Emitted::Expression("Serial.available()".to_string(), Order::FUNCTION_CALL)
}

fn serial_read(g: &mut Generator<'_>, _: &Block) -> Emitted {
    g.session_mut().mark_used(Resource::Serial);
    Emitted::Expression("Serial.read()".to_string(), Order::FUNCTION_CALL)
}

// ── Control ─────────────────────────────────────────────────────────────────

/// `if / else if / else` over `(condition socket, body socket)` pairs.
fn conditional(
    g: &mut Generator<'_>,
    block: &Block,
    branches: &[(&str, &str)],
    else_socket: Option<&str>,
) -> Emitted {
    let mut code = String::new();
    for (i, (cond, body)) in branches.iter().enumerate() {
        let condition = g.emit_value(block, cond, Order::NONE, "false").into_wrapped();
        let branch = g.emit_statements(block, body);
        let keyword = if i == 0 { "if" } else { "} else if" };
        let _ = write!(code, "{} ({}) {{\n{}", keyword, condition, branch);
    }
    if let Some(socket) = else_socket {
        let branch = g.emit_statements(block, socket);
        let _ = write!(code, "}} else {{\n{}", branch);
    }
    code.push_str("}\n");
    Emitted::Statement(code)
}

fn esp32_if(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(g, block, &[("CONDITION", "DO")], None)
}

fn esp32_if_else(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(g, block, &[("CONDITION", "DO")], Some("ELSE"))
}

fn if_elseif(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(g, block, &[("IF0", "DO0"), ("IF1", "DO1")], None)
}

fn if_elseif_else(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(g, block, &[("IF0", "DO0"), ("IF1", "DO1")], Some("ELSE"))
}

fn if_multiple(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(
        g,
        block,
        &[("IF0", "DO0"), ("IF1", "DO1"), ("IF2", "DO2")],
        Some("ELSE"),
    )
}

fn clear_if_else(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(
        g,
        block,
        &[("CONDITION", "IF_STATEMENTS")],
        Some("ELSE_STATEMENTS"),
    )
}

fn simple_if_else(g: &mut Generator<'_>, block: &Block) -> Emitted {
    conditional(g, block, &[("CONDITION", "IF_DO")], Some("ELSE_DO"))
}

/// Mutator-driven `if`: branch count comes from `extraState` and from the
/// highest `IF<n>`/`DO<n>` socket present.
fn controls_if(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let state = block.extra_state.as_ref();
    let declared = state
        .and_then(|s| s.get("elseIfCount"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;
    let present = block
        .value_inputs
        .keys()
        .chain(block.statement_inputs.keys())
        .filter_map(|name| {
            name.strip_prefix("IF")
                .or_else(|| name.strip_prefix("DO"))
                .and_then(|n| n.parse::<usize>().ok())
        })
        .max()
        .unwrap_or(0);
    let count = (declared + 1).max(present + 1).min(MAX_ELSE_IF + 1);
    let has_else = state
        .and_then(|s| s.get("hasElse"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
        || block.statement_inputs.contains_key("ELSE");

    let names: Vec<(String, String)> = (0..count)
        .map(|i| (format!("IF{}", i), format!("DO{}", i)))
        .collect();
    let branches: Vec<(&str, &str)> = names
        .iter()
        .map(|(c, b)| (c.as_str(), b.as_str()))
        .collect();
    conditional(g, block, &branches, has_else.then_some("ELSE"))
}

fn esp32_while(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let condition = g
        .emit_value(block, "CONDITION", Order::NONE, "false")
        .into_wrapped();
    let branch = g.emit_statements(block, "DO");
    Emitted::Statement(format!("while ({}) {{\n{}}}\n", condition, branch))
}

fn while_until(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let until = block.field_text("MODE") == "UNTIL";
    let condition = g
        .emit_value(block, "BOOL", Order::NONE, "false")
        .into_wrapped();
    let branch = g.emit_statements(block, "DO");
    let head = if until {
        format!("while (!({}))", condition)
    } else {
        format!("while ({})", condition)
    };
    Emitted::Statement(format!("{} {{\n{}}}\n", head, branch))
}

fn counted_loop(g: &mut Generator<'_>, block: &Block, times: String) -> Emitted {
    let counter = g.session_mut().names.distinct("count");
    let branch = g.emit_statements(block, "DO");
    Emitted::Statement(format!(
        "for (int {c} = 0; {c} < {n}; {c}++) {{\n{b}}}\n",
        c = counter,
        n = times,
        b = branch
    ))
}

fn repeat_ext(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let times = g
        .emit_value(block, "TIMES", Order::ASSIGNMENT, "0")
        .into_wrapped();
    counted_loop(g, block, times)
}

fn repeat_fixed(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let times = number_literal(&block.field_text("TIMES")).0;
    counted_loop(g, block, times)
}

fn flow_statement(_: &mut Generator<'_>, block: &Block) -> Emitted {
    let keyword = if block.field_text("FLOW") == "CONTINUE" {
        "continue"
    } else {
        "break"
    };
    Emitted::Statement(format!("{};\n", keyword))
}

// ── Logic ───────────────────────────────────────────────────────────────────

fn logic_compare(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let (op, order) = match &*block.field_text("OP") {
        "NEQ" => ("!=", Order::EQUALITY),
        "LT" => ("<", Order::RELATIONAL),
        "LTE" => ("<=", Order::RELATIONAL),
        "GT" => (">", Order::RELATIONAL),
        "GTE" => (">=", Order::RELATIONAL),
        _ => ("==", Order::EQUALITY),
    };
    let a = g.emit_value(block, "A", order, "0").into_wrapped();
    let b = g.emit_value(block, "B", order, "0").into_wrapped();
    Emitted::Expression(format!("{} {} {}", a, op, b), order)
}

fn logic_operation(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let and = block.field_text("OP") != "OR";
    let (op, order) = if and {
        ("&&", Order::LOGICAL_AND)
    } else {
        ("||", Order::LOGICAL_OR)
    };
    let a = g.emit_value(block, "A", order, "false");
    let b = g.emit_value(block, "B", order, "false");
    if a.fallback && b.fallback {
        let code = if and { "false" } else { "true" };
        return Emitted::Expression(code.to_string(), Order::ATOMIC);
    }
    Emitted::Expression(
        format!("{} {} {}", a.into_wrapped(), op, b.into_wrapped()),
        order,
    )
}

fn logic_boolean(_: &mut Generator<'_>, block: &Block) -> Emitted {
    let code = if block.field_text("BOOL") == "TRUE" {
        "true"
    } else {
        "false"
    };
    Emitted::Expression(code.to_string(), Order::ATOMIC)
}

fn logic_negate(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let operand = g
        .emit_value(block, "BOOL", Order::LOGICAL_NOT, "true")
        .into_wrapped();
    Emitted::Expression(format!("!{}", operand), Order::LOGICAL_NOT)
}

// ── Math ────────────────────────────────────────────────────────────────────

/// Parse a numeric field; unparsable text becomes `0`.
fn number_literal(raw: &str) -> (String, Order) {
    match raw.trim().parse::<f64>() {
        Ok(n) if n < 0.0 => (format_number(n), Order::UNARY_MINUS),
        Ok(n) => (format_number(n), Order::ATOMIC),
        Err(_) => ("0".to_string(), Order::ATOMIC),
    }
}

fn math_number(_: &mut Generator<'_>, block: &Block) -> Emitted {
    let (code, order) = number_literal(&block.field_text("NUM"));
    Emitted::Expression(code, order)
}

fn math_arithmetic(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let (op, order) = match &*block.field_text("OP") {
        "MINUS" => (Some(" - "), Order::SUBTRACTION),
        "MULTIPLY" => (Some(" * "), Order::MULTIPLICATION),
        "DIVIDE" => (Some(" / "), Order::DIVISION),
        "POWER" => (None, Order::COMMA),
        _ => (Some(" + "), Order::ADDITION),
    };
    let a = g.emit_value(block, "A", order, "0").into_wrapped();
    let b = g.emit_value(block, "B", order, "0").into_wrapped();
    match op {
        Some(op) => Emitted::Expression(format!("{}{}{}", a, op, b), order),
        None => Emitted::Expression(format!("pow({}, {})", a, b), Order::FUNCTION_CALL),
    }
}

// ── Variables ───────────────────────────────────────────────────────────────

fn variables_get(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let name = g.session_mut().variable(&block.field_text("VAR"));
    Emitted::Expression(name, Order::ATOMIC)
}

fn variables_set(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let value = g
        .emit_value(block, "VALUE", Order::ASSIGNMENT, "0")
        .into_wrapped();
    let name = g.session_mut().variable(&block.field_text("VAR"));
    Emitted::Statement(format!("{} = {};\n", name, value))
}

// ── Text ────────────────────────────────────────────────────────────────────

/// C string literal for `s`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn text(_: &mut Generator<'_>, block: &Block) -> Emitted {
    Emitted::Expression(quote(&block.field_text("TEXT")), Order::ATOMIC)
}

fn text_raw(_: &mut Generator<'_>, block: &Block) -> Emitted {
    let raw = block.field_text("RAW");
    let code = if raw.is_empty() {
        "\"\"".to_string()
    } else {
        raw.into_owned()
    };
    Emitted::Expression(code, Order::ATOMIC)
}

// ── Program structure ───────────────────────────────────────────────────────

fn program_setup(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let body = g.statement_body(block, "DO");
    g.session_mut().user_init.push_str(&body);
    Emitted::empty()
}

fn program_loop(g: &mut Generator<'_>, block: &Block) -> Emitted {
    let body = g.statement_body(block, "DO");
    g.session_mut().user_loop.push_str(&body);
    Emitted::empty()
}
