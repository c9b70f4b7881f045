//! History file scanning and change extraction.

use super::region::RegionState;
use super::{
    history_path, HISTORY_ENTRY_COUNT, HISTORY_ENTRY_POS_LAUNCH, HISTORY_ENTRY_SIZE,
    HISTORY_FILE_SIZE,
};
use crate::error::Result;
use crate::fs::{CardFs, FileAttr};
use crate::title_id;
use tracing::{debug, trace};

/// A slot whose checksum moved since the last scan, with its sanitized id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub slot: usize,
    pub title_id: String,
}

/// Computes the per-slot checksums of a history file image.
///
/// An occupied slot (non-zero first byte) checksums to the XOR of its launch
/// span; an empty slot is forced to 0. XOR is order-sensitive but collision
/// tolerant: two launch spans XORing to the same value are missed. Card
/// images in the field depend on this exact behavior, so it stays.
pub fn read_slots(file: &[u8]) -> [u8; HISTORY_ENTRY_COUNT] {
    let mut slots = [0u8; HISTORY_ENTRY_COUNT];
    for (i, slot) in slots.iter_mut().enumerate() {
        let base = i * HISTORY_ENTRY_SIZE;
        if file[base] != 0 {
            for &b in &file[base + HISTORY_ENTRY_POS_LAUNCH..base + HISTORY_ENTRY_SIZE] {
                *slot ^= b;
            }
        }
    }
    slots
}

/// Re-reads a region's history file, diffs it against the stored baseline,
/// and returns the changed slots whose title ids survive sanitation. The
/// baseline is replaced by the fresh checksums.
pub fn rescan(fs: &mut dyn CardFs, region: &mut RegionState) -> Result<Vec<SlotChange>> {
    let path = history_path(region.tag);
    let fd = fs.open(&path, FileAttr::READABLE)?;
    let mut buf = [0u8; HISTORY_FILE_SIZE];
    let read = fs.read(fd, &mut buf);
    let close = fs.close(fd);
    let n = read?;
    close?;
    trace!(region = %region.tag, bytes = n, "rescanning history file");

    let fresh = read_slots(&buf);
    let mut changes = Vec::new();
    for (slot, (&new_sum, &old_sum)) in fresh.iter().zip(region.baseline.iter()).enumerate() {
        if new_sum == old_sum {
            continue;
        }
        let base = slot * HISTORY_ENTRY_SIZE;
        match title_id::sanitize(&buf[base..base + HISTORY_ENTRY_POS_LAUNCH]) {
            Some(id) => {
                debug!(region = %region.tag, slot, id = %id, "launch slot changed");
                changes.push(SlotChange { slot, title_id: id });
            }
            // Likely a garbled in-flight write; the next scan self-corrects.
            None => debug!(region = %region.tag, slot, "changed slot failed title-id sanitation"),
        }
    }
    region.baseline = fresh;
    Ok(changes)
}
