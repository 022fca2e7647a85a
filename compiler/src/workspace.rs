// workspace.rs — Load the block editor's JSON serialization into an arena
//
// Accepts the editor's saved form (`{"blocks": {"blocks": [...]},
// "variables": [...]}`) or a bare array of top-level blocks. Inputs are
// classified as value or statement sockets from the registry shape; kinds the
// registry does not know fall back to the attached child's shape.
//
// Statement chains nest two JSON levels per block, so the document is walked
// with an explicit work stack rather than recursion, and JSON trees are taken
// apart level by level instead of being dropped whole.
//
// Preconditions: the registry describes the kinds it knows about.
// Postconditions: containers never hold a predecessor or successor link.
//                 Block ids are handed out in document pre-order.
// Failure modes: malformed JSON → `LoadError::Json`; a document or block of
//                the wrong shape → `LoadError::Format`.
// Side effects: `tracing::warn!` for every repaired link.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::block::{Block, FieldValue, Position, Workspace, WorkspaceError};
use crate::diag::{codes, Diagnostic};
use crate::id::BlockId;
use crate::registry::{InputKind, Registry};

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid workspace JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid workspace document: {0}")]
    Format(String),
    #[error("invalid workspace structure: {0}")]
    Structure(#[from] WorkspaceError),
}

/// A loaded workspace plus the repairs made while loading it.
#[derive(Debug)]
pub struct Loaded {
    pub workspace: Workspace,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// Parse workspace JSON text.
pub fn load_workspace(source: &str, registry: &Registry) -> Result<Loaded, LoadError> {
    load_value(parse_json(source)?, registry)
}

/// Parse JSON of any nesting depth. The parser's own limit is off and the
/// stack grows on the heap as the document nests.
pub fn parse_json(source: &str) -> Result<Value, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(source);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// Drop a JSON tree one level at a time.
pub fn discard(value: Value) {
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        match value {
            Value::Array(items) => stack.extend(items),
            Value::Object(map) => stack.extend(map.into_iter().map(|(_, v)| v)),
            _ => {}
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Serialized form ─────────────────────────────────────────────────────────

/// One serialized block with its links lifted out of the JSON tree.
struct RawBlock {
    kind: String,
    id: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    fields: Map<String, Value>,
    /// Socket name → attached block, in socket-name order.
    inputs: Vec<(String, Value)>,
    next: Option<Value>,
    disabled: bool,
    extra_state: Option<Value>,
}

impl RawBlock {
    fn take(value: Value) -> Result<RawBlock, LoadError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                let found = json_type(&other);
                discard(other);
                return Err(LoadError::Format(format!(
                    "expected a block object, found {}",
                    found
                )));
            }
        };
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => {
                discard(Value::Object(map));
                return Err(LoadError::Format(
                    "block without a string \"type\"".to_string(),
                ));
            }
        };
        let inputs = match map.remove("inputs") {
            Some(Value::Object(inputs)) => inputs
                .into_iter()
                .filter_map(|(socket, conn)| connection_target(conn).map(|b| (socket, b)))
                .collect(),
            Some(other) => {
                discard(other);
                Vec::new()
            }
            None => Vec::new(),
        };
        let next = map.remove("next").and_then(connection_target);
        let fields = match map.remove("fields") {
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                discard(other);
                Map::new()
            }
            None => Map::new(),
        };
        let extra_state = map.remove("extraState").filter(|v| !v.is_null());
        let disabled = map.get("enabled") == Some(&Value::Bool(false))
            || map
                .get("disabledReasons")
                .and_then(Value::as_array)
                .is_some_and(|reasons| !reasons.is_empty());
        let raw = RawBlock {
            kind,
            id: map.get("id").and_then(Value::as_str).map(str::to_string),
            x: map.get("x").and_then(Value::as_f64),
            y: map.get("y").and_then(Value::as_f64),
            fields,
            inputs,
            next,
            disabled,
            extra_state,
        };
        discard(Value::Object(map));
        Ok(raw)
    }
}

/// The block hanging off a `{"block": ..., "shadow": ...}` connection. A real
/// block wins over its shadow.
fn connection_target(conn: Value) -> Option<Value> {
    let Value::Object(mut conn) = conn else {
        discard(conn);
        return None;
    };
    let target = conn
        .remove("block")
        .filter(|b| !b.is_null())
        .or_else(|| conn.remove("shadow").filter(|s| !s.is_null()));
    discard(Value::Object(conn));
    target
}

/// Split a document into its top-level blocks and its variable id → name map.
fn split_document(value: Value) -> Result<(Vec<Value>, HashMap<String, String>), LoadError> {
    match value {
        Value::Array(blocks) => Ok((blocks, HashMap::new())),
        Value::Object(mut doc) => {
            let variables = match doc.remove("variables") {
                Some(Value::Array(vars)) => vars
                    .iter()
                    .filter_map(|v| {
                        let name = v.get("name")?.as_str()?;
                        let id = v.get("id")?.as_str()?;
                        Some((id.to_string(), name.to_string()))
                    })
                    .collect(),
                _ => HashMap::new(),
            };
            let tops = match doc.remove("blocks") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(blocks)) => blocks,
                Some(Value::Object(mut top)) => {
                    let blocks = match top.remove("blocks") {
                        None | Some(Value::Null) => Ok(Vec::new()),
                        Some(Value::Array(blocks)) => Ok(blocks),
                        Some(other) => Err(other),
                    };
                    discard(Value::Object(top));
                    match blocks {
                        Ok(blocks) => blocks,
                        Err(other) => {
                            let found = json_type(&other);
                            discard(other);
                            discard(Value::Object(doc));
                            return Err(LoadError::Format(format!(
                                "\"blocks.blocks\" must be an array, found {}",
                                found
                            )));
                        }
                    }
                }
                Some(other) => {
                    let found = json_type(&other);
                    discard(other);
                    discard(Value::Object(doc));
                    return Err(LoadError::Format(format!(
                        "\"blocks\" must be an object or an array, found {}",
                        found
                    )));
                }
            };
            discard(Value::Object(doc));
            Ok((tops, variables))
        }
        other => Err(LoadError::Format(format!(
            "expected a workspace object or an array of blocks, found {}",
            json_type(&other)
        ))),
    }
}

// ── Loader ──────────────────────────────────────────────────────────────────

/// Load an already-parsed JSON value (the service receives these).
pub fn load_value(value: Value, registry: &Registry) -> Result<Loaded, LoadError> {
    let (tops, variables) = split_document(value)?;
    let mut loader = Loader {
        registry,
        variables,
        workspace: Workspace::new(),
        diagnostics: Vec::new(),
    };
    let mut pending: Vec<Pending> = tops
        .into_iter()
        .rev()
        .map(|value| Pending {
            value,
            attach: Attach::Root,
            inherited_y: 0.0,
        })
        .collect();
    let walked = loader.walk(&mut pending);
    for left in pending {
        discard(left.value);
    }
    walked?;
    Ok(Loaded {
        workspace: loader.workspace,
        diagnostics: loader.diagnostics,
    })
}

/// Where a block waiting on the work stack gets connected.
enum Attach {
    Root,
    Input { parent: BlockId, socket: String },
    Next { prev: BlockId },
}

struct Pending {
    value: Value,
    attach: Attach,
    /// Height for blocks whose coordinates are not serialized (children).
    inherited_y: f64,
}

struct Loader<'r> {
    registry: &'r Registry,
    variables: HashMap<String, String>,
    workspace: Workspace,
    diagnostics: Vec<Diagnostic>,
}

impl Loader<'_> {
    /// Pop blocks until the stack is empty. A block's inputs are pushed
    /// above its successor, so each subtree is finished before the chain
    /// moves on.
    fn walk(&mut self, pending: &mut Vec<Pending>) -> Result<(), LoadError> {
        while let Some(Pending {
            value,
            attach,
            inherited_y,
        }) = pending.pop()
        {
            let mut raw = RawBlock::take(value)?;
            let y = raw.y.unwrap_or(inherited_y);
            let has_next = raw.next.is_some();
            let id = self.add(&mut raw, y);

            if let Some(next) = raw.next.take() {
                pending.push(Pending {
                    value: next,
                    attach: Attach::Next { prev: id },
                    inherited_y: y,
                });
            }
            for (socket, child) in std::mem::take(&mut raw.inputs).into_iter().rev() {
                pending.push(Pending {
                    value: child,
                    attach: Attach::Input { parent: id, socket },
                    inherited_y: y,
                });
            }

            match attach {
                Attach::Root => {}
                Attach::Input { parent, socket } => {
                    self.attach_input(parent, &socket, id, &raw.kind, has_next)?
                }
                Attach::Next { prev } => {
                    if self.chains(&self.workspace.block(prev).kind, &raw.kind) {
                        self.workspace.connect_next(prev, id)?;
                    } else {
                        self.sever(prev, id, inherited_y);
                    }
                }
            }
        }
        Ok(())
    }

    /// Create the block itself, without any of its links.
    fn add(&mut self, raw: &mut RawBlock, y: f64) -> BlockId {
        let mut block = Block::new(raw.kind.as_str());
        block.source_id = raw.id.take();
        block.disabled = raw.disabled;
        block.extra_state = raw.extra_state.take();
        block.position = Position {
            x: raw.x.unwrap_or(0.0),
            y,
        };
        let fields = std::mem::take(&mut raw.fields);
        for (name, value) in &fields {
            let field = self.field_value(&raw.kind, name, value);
            block.fields.insert(name.clone(), field);
        }
        discard(Value::Object(fields));
        if let Some(shape) = self.registry.lookup(&raw.kind) {
            for spec in &shape.fields {
                block
                    .fields
                    .entry(spec.name.clone())
                    .or_insert_with(|| FieldValue::Text(spec.default.clone()));
            }
        }
        self.workspace.add(block)
    }

    fn attach_input(
        &mut self,
        parent: BlockId,
        socket: &str,
        child: BlockId,
        child_kind: &str,
        child_has_next: bool,
    ) -> Result<(), LoadError> {
        let parent_kind = self.workspace.block(parent).kind.clone();
        match self.classify(&parent_kind, socket, child_kind, child_has_next) {
            InputKind::Value => {
                self.workspace.connect_value(parent, socket, child)?;
                if !self.registry.accepts(&parent_kind, socket, child_kind) {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            Some(child),
                            format!(
                                "'{}' does not fit socket '{}' of '{}'",
                                child_kind, socket, parent_kind
                            ),
                        )
                        .with_code(codes::W0105)
                        .with_related(parent),
                    );
                }
            }
            InputKind::Statement => self.workspace.connect_statement(parent, socket, child)?,
        }
        Ok(())
    }

    /// Whether `prev` may be followed by `next`. Containers refuse both ends.
    fn chains(&self, prev: &str, next: &str) -> bool {
        let prev_ok = self.registry.lookup(prev).map_or(true, |s| s.next);
        let next_ok = self.registry.lookup(next).map_or(true, |s| s.previous);
        prev_ok && next_ok
    }

    /// Leave `next` as a root placed at its would-be predecessor's height.
    fn sever(&mut self, prev: BlockId, next: BlockId, y: f64) {
        let prev_kind = self.workspace.block(prev).kind.clone();
        let next_kind = self.workspace.block(next).kind.clone();
        tracing::warn!(
            from = %prev_kind,
            to = %next_kind,
            "severed link to or from a container block"
        );
        if let Some(b) = self.workspace.get_mut(next) {
            b.position.y = y;
        }
        self.diagnostics.push(
            Diagnostic::warning(
                Some(next),
                format!("'{}' cannot follow '{}'; it was detached", next_kind, prev_kind),
            )
            .with_code(codes::W0104)
            .with_related(prev),
        );
    }

    fn classify(
        &self,
        parent_kind: &str,
        socket: &str,
        child_kind: &str,
        child_has_next: bool,
    ) -> InputKind {
        if let Some(kind) = self
            .registry
            .lookup(parent_kind)
            .and_then(|s| s.input_kind(socket))
        {
            return kind;
        }
        match self.registry.lookup(child_kind) {
            Some(shape) if shape.is_value_kind() => InputKind::Value,
            Some(_) => InputKind::Statement,
            None if child_has_next => InputKind::Statement,
            None => InputKind::Value,
        }
    }

    fn field_value(&mut self, kind: &str, name: &str, value: &Value) -> FieldValue {
        match value {
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Object(map) => {
                // Variable reference: `{"id": "..."}`, sometimes with a name.
                if let Some(id) = map.get("id").and_then(|v| v.as_str()) {
                    if let Some(var) = self.variables.get(id) {
                        return FieldValue::Text(var.clone());
                    }
                    if let Some(name) = map.get("name").and_then(|v| v.as_str()) {
                        return FieldValue::Text(name.to_string());
                    }
                    self.diagnostics.push(
                        Diagnostic::warning(
                            None,
                            format!(
                                "field '{}' of '{}' refers to unknown variable id '{}'",
                                name, kind, id
                            ),
                        )
                        .with_code(codes::W0106),
                    );
                    return FieldValue::Text(id.to_string());
                }
                match map.get("name").and_then(|v| v.as_str()) {
                    Some(n) => FieldValue::Text(n.to_string()),
                    None => FieldValue::Text(value.to_string()),
                }
            }
            Value::Null => FieldValue::Text(String::new()),
            Value::Array(_) => FieldValue::Text(value.to_string()),
        }
    }
}
