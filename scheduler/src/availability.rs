//! Per-item index of blocking date ranges.
//!
//! Holds the sorted accepted ranges of each item so availability queries do
//! not touch the store. Readers may observe a slightly stale index; the
//! authoritative overlap check runs again inside the atomic accept, so
//! staleness can only ever produce a spurious "looks available" in the UI.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;

use catalog::types::ItemId;
use reservation::interval::DateRange;

#[derive(Default)]
pub struct AvailabilityIndex {
    blocks: RwLock<HashMap<ItemId, Arc<Vec<DateRange>>>>,
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the block list for an item from its current accepted
    /// reservations. Idempotent; safe to call repeatedly from a background
    /// refresh.
    pub fn rebuild(&self, item_id: ItemId, mut ranges: Vec<DateRange>) {
        ranges.sort_by_key(|r| r.start());

        let mut guard = self
            .blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if ranges.is_empty() {
            guard.remove(&item_id);
        } else {
            guard.insert(item_id, Arc::new(ranges));
        }
    }

    /// Drop the block list for an item entirely.
    pub fn clear(&self, item_id: ItemId) {
        self.blocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&item_id);
    }

    fn item_blocks(&self, item_id: ItemId) -> Option<Arc<Vec<DateRange>>> {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item_id)
            .cloned()
    }

    /// Is a single day free for this item? Unknown items are fully
    /// available.
    pub fn is_available(&self, item_id: ItemId, day: NaiveDate) -> bool {
        let Some(blocks) = self.item_blocks(item_id) else {
            return true;
        };

        // Blocks are sorted by start and pairwise disjoint: the only block
        // that can cover `day` is the first one ending at or after it.
        let idx = blocks.partition_point(|b| b.end() < day);
        match blocks.get(idx) {
            Some(b) => !b.contains(day),
            None => true,
        }
    }

    /// Is the whole inclusive range free of blocks?
    pub fn is_range_available(&self, item_id: ItemId, range: &DateRange) -> bool {
        let Some(blocks) = self.item_blocks(item_id) else {
            return true;
        };

        let idx = blocks.partition_point(|b| b.end() < range.start());
        match blocks.get(idx) {
            Some(b) => !b.overlaps(range),
            None => true,
        }
    }

    /// The blocked calendar days of an item, in ascending order. Lazy,
    /// finite and restartable; meant for calendar-picker rendering only —
    /// conflict checks always work on the interval form.
    pub fn blocked_days(&self, item_id: ItemId) -> BlockedDays {
        BlockedDays {
            blocks: self.item_blocks(item_id).unwrap_or_default(),
            next_block: 0,
            cursor: None,
        }
    }
}

/// Iterator over every blocked day of one item.
#[derive(Clone)]
pub struct BlockedDays {
    blocks: Arc<Vec<DateRange>>,
    next_block: usize,
    cursor: Option<NaiveDate>,
}

impl Iterator for BlockedDays {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        loop {
            match self.cursor {
                Some(day) => {
                    let block = self.blocks[self.next_block - 1];
                    if day > block.end() {
                        self.cursor = None;
                        continue;
                    }
                    self.cursor = day.succ_opt();
                    return Some(day);
                }
                None => {
                    let block = self.blocks.get(self.next_block)?;
                    self.cursor = Some(block.start());
                    self.next_block += 1;
                }
            }
        }
    }
}
