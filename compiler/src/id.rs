// id.rs — Stable identifiers for blocks in a loaded workspace
//
// Blocks live in an arena owned by `Workspace`; a `BlockId` is the arena
// index. IDs are allocated in discovery order (depth-first over the editor's
// serialization), which is also the tie-break order for root sorting.

use std::fmt;

use serde::Serialize;

/// Stable identifier for a block inside one `Workspace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for block IDs. Produces monotonically increasing IDs in
/// allocation (discovery) order, ensuring deterministic assignment.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_block: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    /// Number of IDs handed out so far.
    pub fn allocated(&self) -> usize {
        self.next_block as usize
    }
}
