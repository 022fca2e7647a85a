// names.rs — Reserved-word-safe identifier allocation
//
// `safe_name` is a pure function; `NameTable` memoizes it per generation
// session so the same user identifier always maps to the same C identifier.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Words a generated identifier must never collide with: C/C++ keywords,
/// sketch entry points and the Arduino core API.
pub const RESERVED_WORDS: &[&str] = &[
    // entry points
    "setup", "loop",
    // statements and literals
    "if", "else", "for", "switch", "case", "while", "do", "break", "continue", "function",
    "return", "goto", "try", "throw", "catch", "finally", "true", "false", "null", "undefined",
    "default", "sizeof", "new", "delete", "this", "class", "struct", "union", "enum",
    "typedef", "namespace", "template", "operator",
    // types and qualifiers
    "void", "int", "float", "double", "char", "byte", "boolean", "bool", "word", "long",
    "short", "signed", "unsigned", "const", "static", "volatile", "extern", "register",
    "auto", "String", "Array",
    // Arduino core
    "pinMode", "digitalWrite", "digitalRead", "analogRead", "analogWrite", "delay",
    "delayMicroseconds", "millis", "micros", "Serial", "HIGH", "LOW", "INPUT", "OUTPUT",
    "INPUT_PULLUP", "INPUT_PULLDOWN", "LED_BUILTIN", "pow", "abs", "min", "max", "map",
    "constrain", "random",
];

/// Replace everything that cannot appear in a C identifier.
///
/// Spaces and ASCII punctuation become `_`; a non-ASCII character becomes
/// `u` plus its lowercase hex code point. Runs of `_` collapse to one and
/// leading or trailing `_` are dropped, so the result never takes the forms
/// C and C++ reserve (`_X...`, `__`, file-scope `_x`). A leading digit gets
/// a `my_` prefix; a name with nothing left becomes `unnamed`.
pub fn sanitize(requested: &str) -> String {
    fn separate(out: &mut String) {
        if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }

    let mut out = String::with_capacity(requested.len());
    for c in requested.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if c.is_ascii() {
            separate(&mut out);
        } else {
            separate(&mut out);
            let _ = write!(out, "u{:x}_", c as u32);
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        return "unnamed".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "my_");
    }
    out
}

/// Sanitize `requested` and append the smallest suffix (2, 3, ...) that
/// avoids both `reserved` and `taken`.
pub fn safe_name(requested: &str, reserved: &HashSet<String>, taken: &HashSet<String>) -> String {
    let base = sanitize(requested);
    let clashes = |name: &str| reserved.contains(name) || taken.contains(name);
    if !clashes(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{}{}", base, n);
        if !clashes(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Session-scoped name table.
#[derive(Debug, Clone)]
pub struct NameTable {
    reserved: HashSet<String>,
    taken: HashSet<String>,
    by_user: HashMap<String, String>,
}

impl Default for NameTable {
    fn default() -> Self {
        NameTable::new(RESERVED_WORDS.iter().copied())
    }
}

impl NameTable {
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        NameTable {
            reserved: reserved.into_iter().map(str::to_string).collect(),
            taken: HashSet::new(),
            by_user: HashMap::new(),
        }
    }

    /// Identifier for a user-visible name. Repeated calls return the same
    /// identifier.
    pub fn get(&mut self, user: &str) -> String {
        if let Some(name) = self.by_user.get(user) {
            return name.clone();
        }
        let name = safe_name(user, &self.reserved, &self.taken);
        self.taken.insert(name.clone());
        self.by_user.insert(user.to_string(), name.clone());
        name
    }

    /// A fresh identifier never handed out before in this session.
    pub fn distinct(&mut self, base: &str) -> String {
        let name = safe_name(base, &self.reserved, &self.taken);
        self.taken.insert(name.clone());
        name
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }
}
