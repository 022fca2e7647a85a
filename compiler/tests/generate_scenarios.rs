// End-to-end generation scenarios: workspace JSON in, sketch text out.
//
// Uses the library API (load → assemble) directly. Fixtures live under
// `compiler/tests/fixtures/`.

use std::path::{Path, PathBuf};

use blockc::codegen::{ButtonPolicy, GeneratorOptions, RuleTable};
use blockc::diag::{codes, DiagCode};
use blockc::pipeline::{generate_source, GenerateResult};
use blockc::registry::Registry;

// ── Test helpers ────────────────────────────────────────────────────────────

fn fixture(name: &str) -> String {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}

fn generate_with(src: &str, options: GeneratorOptions) -> GenerateResult {
    generate_source(src, &Registry::esp32(), &RuleTable::esp32(), options)
        .unwrap_or_else(|e| panic!("load failed: {}", e))
}

fn generate(src: &str) -> GenerateResult {
    generate_with(src, GeneratorOptions::default())
}

fn codes_of(result: &GenerateResult) -> Vec<DiagCode> {
    result.diagnostics.iter().filter_map(|d| d.code).collect()
}

/// Text between `void loop() {` and the closing brace.
fn loop_body(code: &str) -> &str {
    let start = code.find("void loop() {\n").expect("loop function") + "void loop() {\n".len();
    let end = code.rfind("}\n").expect("closing brace");
    &code[start..end]
}

/// Text between `void setup() {` and its closing brace.
fn setup_body(code: &str) -> &str {
    let start = code.find("void setup() {\n").expect("setup function") + "void setup() {\n".len();
    let end = code.find("}\n\nvoid loop() {").expect("end of setup");
    &code[start..end]
}

// ── Fixtures ────────────────────────────────────────────────────────────────

#[test]
fn blink_sketch() {
    let result = generate(&fixture("blink.json"));
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    insta::assert_snapshot!(result.code, @r"
    // Generated by ESP32 Blockly IDE
    // Edit at your own risk!

    void setup() {
      pinMode(13, OUTPUT);
    }

    void loop() {
      digitalWrite(13, HIGH);
      delay(500);
      digitalWrite(13, LOW);
      delay(500);
    }
    ");
}

#[test]
fn unconfigured_pin_is_reported_in_the_header() {
    let result = generate(&fixture("unconfigured_pin.json"));
    let code = &result.code;
    let warning = code
        .find("// WARNING: pin 5 is used but never configured; add a pinMode block for it.")
        .expect("warning line");
    let setup = code.find("void setup()").expect("setup function");
    assert!(warning < setup, "warning must precede setup:\n{}", code);
    assert_eq!(loop_body(code), "  digitalWrite(5, HIGH);\n");
    assert!(code.contains("void setup() {\n  // Initialize your hardware here\n}\n"));
    assert_eq!(codes_of(&result), vec![codes::W0101]);
}

#[test]
fn thermostat_sketch() {
    let result = generate(&fixture("thermostat.json"));
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.roots, 2);
    assert_eq!(
        result.code,
        "// Generated by ESP32 Blockly IDE\n\
         // Edit at your own risk!\n\
         \n\
         double reading = 0;\n\
         \n\
         void setup() {\n\
         \x20 Serial.begin(115200);\n\
         \x20 pinMode(4, OUTPUT);\n\
         }\n\
         \n\
         void loop() {\n\
         \x20 reading = analogRead(A0);\n\
         \x20 if (reading > 2048) {\n\
         \x20   digitalWrite(4, HIGH);\n\
         \x20 } else {\n\
         \x20   digitalWrite(4, LOW);\n\
         \x20 }\n\
         }\n"
    );
}

#[test]
fn generation_is_deterministic() {
    for name in ["blink.json", "unconfigured_pin.json", "thermostat.json"] {
        let src = fixture(name);
        let a = generate(&src);
        let b = generate(&src);
        assert_eq!(a.code, b.code, "{} differs between runs", name);
        assert_eq!(codes_of(&a), codes_of(&b));
    }
}

// ── Structure repairs ───────────────────────────────────────────────────────

#[test]
fn container_chained_below_a_statement_is_relocated() {
    let src = r#"[{"type":"esp32_delay_ms","fields":{"DELAY":"5"},
        "next":{"block":{"type":"program_loop","inputs":{
          "DO":{"block":{"type":"esp32_delay_ms","fields":{"DELAY":"7"}}}}}}}]"#;
    let result = generate(src);
    assert_eq!(result.roots, 2);
    assert_eq!(loop_body(&result.code), "  delay(7);\n");
    assert_eq!(codes_of(&result), vec![codes::W0104, codes::W0102]);
}

#[test]
fn disabled_blocks_generate_nothing() {
    let src = r#"[{"type":"esp32_delay_ms","enabled":false,"fields":{"DELAY":"5"},
        "next":{"block":{"type":"esp32_delay_ms","fields":{"DELAY":"6"}}}}]"#;
    let result = generate(src);
    assert!(!result.code.contains("delay("));
    assert!(result.code.contains("  // Your main code goes here\n"));
}

#[test]
fn containers_land_by_role_whatever_their_height() {
    let src = r#"[
        {"type":"program_loop","x":0,"y":0,"inputs":{"DO":{"block":
          {"type":"esp32_digital_write","fields":{"PIN":"13","STATE":"HIGH"},
           "next":{"block":{"type":"esp32_delay_ms","fields":{"DELAY":"7"}}}}}}},
        {"type":"program_setup","x":0,"y":200,"inputs":{"DO":{"block":
          {"type":"esp32_pin_mode","fields":{"PIN":"13","MODE":"OUTPUT"},
           "next":{"block":{"type":"esp32_digital_write","fields":{"PIN":"13","STATE":"LOW"}}}}}}}
    ]"#;
    let result = generate(src);
    assert_eq!(
        setup_body(&result.code),
        "  pinMode(13, OUTPUT);\n  digitalWrite(13, LOW);\n"
    );
    assert_eq!(
        loop_body(&result.code),
        "  digitalWrite(13, HIGH);\n  delay(7);\n"
    );
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

#[test]
fn ten_thousand_block_chain_fits_a_small_stack() {
    const BLOCKS: usize = 10_000;
    let mut src = String::from("[");
    for _ in 0..BLOCKS - 1 {
        src.push_str(r#"{"type":"esp32_delay_ms","fields":{"DELAY":"5"},"next":{"block":"#);
    }
    src.push_str(r#"{"type":"esp32_delay_ms","fields":{"DELAY":"5"}}"#);
    src.push_str(&"}}".repeat(BLOCKS - 1));
    src.push(']');

    // Same stack size as a tokio worker thread.
    let code = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || generate(&src).code)
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(loop_body(&code).matches("  delay(5);\n").count(), BLOCKS);
}

// ── Emission behaviour ──────────────────────────────────────────────────────

#[test]
fn pulse_after_high_write_skips_the_redundant_write() {
    let src = r#"[{"type":"esp32_pin_mode","fields":{"PIN":"2","MODE":"OUTPUT"},
        "next":{"block":{"type":"esp32_digital_write","fields":{"PIN":"2","STATE":"HIGH"},
        "next":{"block":{"type":"esp32_relay_blink","fields":{"PIN":"2","DELAY_ON":"100","DELAY_OFF":"200"}}}}}}]"#;
    let result = generate(src);
    assert_eq!(
        loop_body(&result.code),
        "  digitalWrite(2, HIGH);\n  delay(100);\n  digitalWrite(2, LOW);\n  delay(200);\n"
    );
    assert!(result.diagnostics.is_empty());
}

#[test]
fn pulse_on_another_pin_keeps_its_write() {
    let src = r#"[{"type":"esp32_digital_write","fields":{"PIN":"3","STATE":"HIGH"},
        "next":{"block":{"type":"esp32_relay_blink","fields":{"PIN":"2"}}}}]"#;
    let body = generate(src).code;
    assert_eq!(body.matches("digitalWrite(2, HIGH);").count(), 1);
    assert_eq!(body.matches("digitalWrite(3, HIGH);").count(), 1);
}

#[test]
fn unknown_kinds_become_placeholders() {
    let src = r#"[{"type":"esp32_serial_println","inputs":{"TEXT":{"block":{"type":"fancy_sensor"}}},
        "next":{"block":{"type":"mystery_motor"}}}]"#;
    let result = generate(src);
    let body = loop_body(&result.code);
    assert!(
        body.contains("Serial.println(/* block kind not implemented: fancy_sensor */ 0);"),
        "{}",
        body
    );
    assert!(body.contains("// block kind not implemented: mystery_motor\n"));
    assert_eq!(
        codes_of(&result),
        vec![codes::W0100, codes::W0100, codes::W0101]
    );
    assert!(result
        .code
        .contains("// WARNING: Serial is used but never configured; add a Serial begin block."));
}

#[test]
fn repeated_configuration_keeps_one_line_per_pin() {
    let src = r#"[{"type":"program_setup","inputs":{"DO":{"block":
        {"type":"esp32_pin_mode","fields":{"PIN":"2","MODE":"OUTPUT"},
         "next":{"block":{"type":"esp32_pin_mode","fields":{"PIN":"2","MODE":"INPUT"},
         "next":{"block":{"type":"esp32_pin_mode","fields":{"PIN":"3","MODE":"OUTPUT"}}}}}}}}}]"#;
    let code = generate(src).code;
    assert!(
        code.contains("void setup() {\n  pinMode(2, INPUT);\n  pinMode(3, OUTPUT);\n}\n"),
        "{}",
        code
    );
    assert_eq!(code.matches("pinMode(2").count(), 1);
}

#[test]
fn nested_arithmetic_is_parenthesized_by_precedence() {
    let src = r#"[{"type":"variables_set","fields":{"VAR":"total"},"inputs":{"VALUE":{"block":
        {"type":"math_arithmetic","fields":{"OP":"MULTIPLY"},"inputs":{
          "A":{"block":{"type":"math_arithmetic","fields":{"OP":"ADD"},"inputs":{
            "A":{"block":{"type":"math_number","fields":{"NUM":1}}},
            "B":{"block":{"type":"math_number","fields":{"NUM":2}}}}}},
          "B":{"block":{"type":"math_number","fields":{"NUM":3}}}}}}}}]"#;
    let code = generate(src).code;
    assert!(code.contains("double total = 0;\n"));
    assert_eq!(loop_body(&code), "  total = (1 + 2) * 3;\n");
}

#[test]
fn reserved_variable_names_are_renamed() {
    let src = r#"{"blocks":{"blocks":[{"type":"variables_set","fields":{"VAR":{"id":"v1"}},
        "inputs":{"VALUE":{"block":{"type":"esp32_millis"}}}}]},
        "variables":[{"name":"delay","id":"v1"}]}"#;
    let code = generate(src).code;
    assert!(code.contains("double delay2 = 0;\n"), "{}", code);
    assert_eq!(loop_body(&code), "  delay2 = millis();\n");
}

#[test]
fn button_policy_controls_inversion() {
    let src = r#"[{"type":"esp32_pin_mode","fields":{"PIN":"0","MODE":"INPUT_PULLUP"},
        "next":{"block":{"type":"esp32_if","inputs":{
          "CONDITION":{"block":{"type":"esp32_button_read","fields":{"PIN":"0"}}},
          "DO":{"block":{"type":"esp32_delay_ms","fields":{"DELAY":"10"}}}}}}}]"#;
    let raw = generate(src).code;
    assert!(raw.contains("  if (digitalRead(0)) {\n"), "{}", raw);
    let inverted = generate_with(
        src,
        GeneratorOptions {
            button_policy: ButtonPolicy::ActiveLow,
        },
    )
    .code;
    assert!(inverted.contains("  if (!digitalRead(0)) {\n"), "{}", inverted);
}

#[test]
fn malformed_workspace_is_a_load_error() {
    let err = generate_source(
        "{\"blocks\": ",
        &Registry::esp32(),
        &RuleTable::esp32(),
        GeneratorOptions::default(),
    )
    .unwrap_err();
    assert!(!err.to_string().is_empty());
}
