//! Block cursor for the poll loop.
//!
//! `last_processed_block == 0` means the cursor has not seen a chain head yet.
//! Once initialized, `next_block_to_check == last_processed_block + 1` holds.

use serde::{Deserialize, Serialize};

/// Cursor: last processed block and the next block to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_processed_block: u64,
    pub next_block_to_check: u64,
}

impl Cursor {
    /// Cursor positioned right after `head` (the head itself counts as processed).
    pub fn new(head: u64) -> Self {
        Self {
            last_processed_block: head,
            next_block_to_check: head + 1,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.last_processed_block != 0
    }

    /// True when there is at least one block at or below `head` left to process.
    pub fn is_behind(&self, head: u64) -> bool {
        self.is_initialized() && self.next_block_to_check <= head
    }

    /// Mark `next_block_to_check` as processed.
    pub fn advance(&mut self) {
        self.last_processed_block = self.next_block_to_check;
        self.next_block_to_check += 1;
    }
}
