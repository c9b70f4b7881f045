//! Downstream game-id notification.
//!
//! The history engine publishes a changed identifier into a single-slot
//! command cell; the protocol layer picks it up on its next service pass. A
//! newer value overwrites an unconsumed one, which matches the "current game"
//! semantics downstream.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-slot "set current game identifier" cell with a pending flag.
#[derive(Debug, Default)]
pub struct GameIdCell {
    slot: Mutex<Option<String>>,
    pending: AtomicBool,
}

impl GameIdCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new identifier and raises the pending signal.
    pub fn set(&self, id: impl Into<String>) {
        *self.slot.lock() = Some(id.into());
        self.pending.store(true, Ordering::Release);
    }

    /// True while a published value has not been consumed.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consumes the pending identifier, clearing the signal.
    pub fn take(&self) -> Option<String> {
        let value = self.slot.lock().take();
        self.pending.store(false, Ordering::Release);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_take_cycle() {
        let cell = GameIdCell::new();
        assert!(!cell.is_pending());
        assert_eq!(cell.take(), None);

        cell.set("SLUS_203.12");
        assert!(cell.is_pending());
        assert_eq!(cell.take().as_deref(), Some("SLUS_203.12"));
        assert!(!cell.is_pending());
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn newer_value_overwrites_unconsumed_one() {
        let cell = GameIdCell::new();
        cell.set("SLUS_203.12");
        cell.set("SCES_524.12");
        assert_eq!(cell.take().as_deref(), Some("SCES_524.12"));
    }
}
