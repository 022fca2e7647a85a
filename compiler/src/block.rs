// block.rs — Block graph data model
//
// A workspace is an arena of blocks. Containment (value sockets, statement
// sockets) forms a tree; `next` links form one singly linked chain per
// container. Every block records how it is attached to its parent so the
// generator can ask "what precedes me" and "am I in value position".
//
// Preconditions: none.
// Postconditions: the arena never holds a cycle and no block has two parents.
// Failure modes: illegal connections are refused with `WorkspaceError`.
// Side effects: none.

use std::borrow::Cow;
use std::collections::BTreeMap;
use serde::Serialize;
use thiserror::Error;

use crate::id::{BlockId, IdAllocator};
use crate::registry::FieldSpec;
use crate::validate::{apply_edit, Rejection};

// ── Field values ────────────────────────────────────────────────────────────

/// Literal value held by a block field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl FieldValue {
    /// Field text as the emission rules see it.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number(n) => Cow::Owned(format_number(*n)),
            FieldValue::Bool(true) => Cow::Borrowed("TRUE"),
            FieldValue::Bool(false) => Cow::Borrowed("FALSE"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Render a number the way a C literal expects: integral values without a
/// fractional part, everything else in shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NAN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ── Positions and parent links ──────────────────────────────────────────────

/// Canvas coordinate. Only `y` matters: it orders the roots.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// How a block hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// The parent's `next` points here.
    Next,
    Value(String),
    Statement(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub block: BlockId,
    pub link: Link,
}

// ── Block ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    /// Identifier assigned by the editor, if the block came from one.
    pub source_id: Option<String>,
    pub kind: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub value_inputs: BTreeMap<String, BlockId>,
    pub statement_inputs: BTreeMap<String, BlockId>,
    pub next: Option<BlockId>,
    pub disabled: bool,
    pub position: Position,
    /// Mutator state (e.g. `elseIfCount` on `controls_if`).
    pub extra_state: Option<serde_json::Value>,
    parent: Option<Parent>,
}

impl Block {
    /// A detached block of `kind`; the id is assigned by `Workspace::add`.
    pub fn new(kind: impl Into<String>) -> Self {
        Block {
            id: BlockId(0),
            source_id: None,
            kind: kind.into(),
            fields: BTreeMap::new(),
            value_inputs: BTreeMap::new(),
            statement_inputs: BTreeMap::new(),
            next: None,
            disabled: false,
            position: Position::default(),
            extra_state: None,
            parent: None,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_extra_state(mut self, state: serde_json::Value) -> Self {
        self.extra_state = Some(state);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Field text, or empty when the field is absent.
    pub fn field_text(&self, name: &str) -> Cow<'_, str> {
        self.fields
            .get(name)
            .map(FieldValue::as_text)
            .unwrap_or(Cow::Borrowed(""))
    }

    pub fn value_input(&self, name: &str) -> Option<BlockId> {
        self.value_inputs.get(name).copied()
    }

    pub fn statement_input(&self, name: &str) -> Option<BlockId> {
        self.statement_inputs.get(name).copied()
    }

    pub fn parent(&self) -> Option<&Parent> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Apply a user edit through the field's validator. A rejected edit
    /// leaves the previous value in place.
    pub fn edit_field(&mut self, spec: &FieldSpec, raw: &str) -> Result<(), Rejection> {
        let mut current = self.field_text(&spec.name).into_owned();
        apply_edit(spec.validator.as_ref(), &mut current, raw)?;
        self.fields
            .insert(spec.name.clone(), FieldValue::Text(current));
        Ok(())
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("no block with id {0}")]
    UnknownBlock(BlockId),
    #[error("block {child} already has a parent")]
    AlreadyAttached { child: BlockId },
    #[error("attaching block {child} under block {parent} would create a cycle")]
    Cycle { parent: BlockId, child: BlockId },
    #[error("socket '{socket}' of block {parent} is already occupied")]
    SocketOccupied { parent: BlockId, socket: String },
}

// ── Workspace ───────────────────────────────────────────────────────────────

/// Arena of blocks plus their connections.
#[derive(Debug, Default)]
pub struct Workspace {
    blocks: Vec<Block>,
    ids: IdAllocator,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached block and return its id.
    pub fn add(&mut self, mut block: Block) -> BlockId {
        let id = self.ids.alloc_block();
        block.id = id;
        block.parent = None;
        block.next = None;
        block.value_inputs.clear();
        block.statement_inputs.clear();
        self.blocks.push(block);
        id
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index())
    }

    /// Look up a block by an id handed out by this workspace.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    // ── Connections ─────────────────────────────────────────────────────

    pub fn connect_next(&mut self, prev: BlockId, next: BlockId) -> Result<(), WorkspaceError> {
        self.check_attach(prev, next)?;
        if self.block(prev).next.is_some() {
            return Err(WorkspaceError::SocketOccupied {
                parent: prev,
                socket: "next".to_string(),
            });
        }
        self.blocks[prev.index()].next = Some(next);
        self.blocks[next.index()].parent = Some(Parent {
            block: prev,
            link: Link::Next,
        });
        Ok(())
    }

    pub fn connect_value(
        &mut self,
        parent: BlockId,
        socket: &str,
        child: BlockId,
    ) -> Result<(), WorkspaceError> {
        self.check_attach(parent, child)?;
        if self.block(parent).value_inputs.contains_key(socket) {
            return Err(WorkspaceError::SocketOccupied {
                parent,
                socket: socket.to_string(),
            });
        }
        self.blocks[parent.index()]
            .value_inputs
            .insert(socket.to_string(), child);
        self.blocks[child.index()].parent = Some(Parent {
            block: parent,
            link: Link::Value(socket.to_string()),
        });
        Ok(())
    }

    pub fn connect_statement(
        &mut self,
        parent: BlockId,
        socket: &str,
        child: BlockId,
    ) -> Result<(), WorkspaceError> {
        self.check_attach(parent, child)?;
        if self.block(parent).statement_inputs.contains_key(socket) {
            return Err(WorkspaceError::SocketOccupied {
                parent,
                socket: socket.to_string(),
            });
        }
        self.blocks[parent.index()]
            .statement_inputs
            .insert(socket.to_string(), child);
        self.blocks[child.index()].parent = Some(Parent {
            block: parent,
            link: Link::Statement(socket.to_string()),
        });
        Ok(())
    }

    /// Detach `child` from its parent, making it a root. Returns the old link.
    pub fn disconnect(&mut self, child: BlockId) -> Option<Parent> {
        let parent = self.blocks.get_mut(child.index())?.parent.take()?;
        let owner = &mut self.blocks[parent.block.index()];
        match &parent.link {
            Link::Next => owner.next = None,
            Link::Value(socket) => {
                owner.value_inputs.remove(socket);
            }
            Link::Statement(socket) => {
                owner.statement_inputs.remove(socket);
            }
        }
        Some(parent)
    }

    fn check_attach(&self, parent: BlockId, child: BlockId) -> Result<(), WorkspaceError> {
        if self.get(parent).is_none() {
            return Err(WorkspaceError::UnknownBlock(parent));
        }
        let Some(c) = self.get(child) else {
            return Err(WorkspaceError::UnknownBlock(child));
        };
        if c.parent.is_some() {
            return Err(WorkspaceError::AlreadyAttached { child });
        }
        if parent == child {
            return Err(WorkspaceError::Cycle { parent, child });
        }
        if c.next.is_none() && c.value_inputs.is_empty() && c.statement_inputs.is_empty() {
            // A block with nothing below it is nobody's ancestor.
            return Ok(());
        }
        // Walk up from the parent; meeting the child means a cycle.
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(WorkspaceError::Cycle { parent, child });
            }
            cursor = self.block(id).parent.as_ref().map(|p| p.block);
        }
        Ok(())
    }

    // ── Navigation ──────────────────────────────────────────────────────

    /// Root blocks in discovery order.
    pub fn roots(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.is_root())
            .map(|b| b.id)
            .collect()
    }

    /// Root blocks ordered top-to-bottom. The sort is stable, so roots at
    /// the same height keep discovery order.
    pub fn sorted_roots(&self) -> Vec<BlockId> {
        let mut roots = self.roots();
        roots.sort_by(|a, b| {
            self.block(*a)
                .position
                .y
                .total_cmp(&self.block(*b).position.y)
        });
        roots
    }

    /// The block whose `next` is `id`, if any.
    pub fn previous(&self, id: BlockId) -> Option<BlockId> {
        match self.get(id)?.parent.as_ref()? {
            Parent {
                block,
                link: Link::Next,
            } => Some(*block),
            _ => None,
        }
    }

    /// True when the block (or the chain it belongs to) sits in a value socket.
    pub fn in_value_position(&self, id: BlockId) -> bool {
        let mut cursor = id;
        loop {
            match self.get(cursor).and_then(|b| b.parent.as_ref()) {
                Some(Parent {
                    block,
                    link: Link::Next,
                }) => cursor = *block,
                Some(Parent {
                    link: Link::Value(_),
                    ..
                }) => return true,
                _ => return false,
            }
        }
    }

    /// Iterate a statement chain starting at `head`.
    pub fn chain(&self, head: Option<BlockId>) -> impl Iterator<Item = &Block> {
        std::iter::successors(head.and_then(|id| self.get(id)), move |b| {
            b.next.and_then(|id| self.get(id))
        })
    }
}
