//! Page-level storage virtualization for the emulated card.
//!
//! The protocol handler mutates card contents through [`PageIo`] while a
//! background writeback task drains dirty pages to the SD card and the history
//! engine watches the activity window. Mutating operations are time-critical:
//! the lock is held only across the backing-store copy and the dirty mark,
//! never across filesystem work or allocation.

pub mod dirty;

pub use dirty::{DirtyMap, DirtyWindow};

use crate::clock::Clock;
use crate::config::CardSpecs;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Byte pattern left behind by a page erase.
pub const ERASE_FILL: u8 = 0xFF;

/// Page operations consumed by the external card filesystem layer.
///
/// Operations on pages beyond the current card size succeed without touching
/// storage, so callers may address the maximum supported geometry against a
/// smaller card. Implementations backed by fallible media must still set the
/// dirty mark on partial failure so a retry scan is triggered.
pub trait PageIo {
    fn page_erase(&self, page: u32) -> Result<()>;

    fn page_write(&self, page: u32, buf: &[u8]) -> Result<()>;

    fn page_read(&self, page: u32, count: usize, buf: &mut [u8]) -> Result<()>;
}

struct StoreInner {
    mem: Vec<u8>,
    dirty: DirtyMap,
}

/// RAM-backed virtual card storage with dirty-page tracking.
pub struct PageStore {
    specs: CardSpecs,
    inner: Mutex<StoreInner>,
    window: DirtyWindow,
    lockout_us: u64,
    clock: Arc<dyn Clock>,
    stats: PageStoreStats,
}

/// Operation counters (lock-free).
pub struct PageStoreStats {
    reads: atomic::Atomic<u64>,
    writes: atomic::Atomic<u64>,
    erases: atomic::Atomic<u64>,
    out_of_range: atomic::Atomic<u64>,
}

impl PageStoreStats {
    fn new() -> Self {
        Self {
            reads: atomic::Atomic::new(0),
            writes: atomic::Atomic::new(0),
            erases: atomic::Atomic::new(0),
            out_of_range: atomic::Atomic::new(0),
        }
    }

    pub fn get_reads(&self) -> u64 {
        self.reads.load(atomic::Ordering::Relaxed)
    }

    pub fn get_writes(&self) -> u64 {
        self.writes.load(atomic::Ordering::Relaxed)
    }

    pub fn get_erases(&self) -> u64 {
        self.erases.load(atomic::Ordering::Relaxed)
    }

    pub fn get_out_of_range(&self) -> u64 {
        self.out_of_range.load(atomic::Ordering::Relaxed)
    }
}

impl PageStore {
    pub fn new(specs: CardSpecs, clock: Arc<dyn Clock>) -> Result<Self> {
        specs.validate()?;
        info!(
            card_size = specs.card_size,
            page_size = specs.page_size,
            "creating page store"
        );
        Ok(PageStore {
            inner: Mutex::new(StoreInner {
                mem: vec![ERASE_FILL; specs.card_size],
                dirty: DirtyMap::new(specs.pages()),
            }),
            window: DirtyWindow::new(),
            lockout_us: crate::config::TrackerConfig::default().lockout_us,
            specs,
            clock,
            stats: PageStoreStats::new(),
        })
    }

    pub fn with_lockout_window(mut self, lockout_us: u64) -> Self {
        self.lockout_us = lockout_us;
        self
    }

    pub fn specs(&self) -> &CardSpecs {
        &self.specs
    }

    pub fn stats(&self) -> &PageStoreStats {
        &self.stats
    }

    /// True when the target page lies beyond the current card size.
    fn out_of_range(&self, page: u32) -> bool {
        let offset = page as usize * self.specs.page_size;
        offset + self.specs.page_size > self.specs.card_size
    }

    /// Number of pages currently marked dirty.
    pub fn dirty_count(&self) -> usize {
        self.inner.lock().dirty.count()
    }

    pub fn is_dirty(&self, page: u32) -> bool {
        self.inner.lock().dirty.is_dirty(page as usize)
    }

    /// True while a writer's lockout renewal has not expired; background
    /// consumers defer their storage access while this holds.
    pub fn is_locked_out(&self, now_us: u64) -> bool {
        self.window.is_locked_out(now_us)
    }

    /// Swaps out the written-since-last-call flag. Polled by the scheduler.
    pub fn take_write_activity(&self) -> bool {
        self.window.take_touched()
    }

    pub fn last_access_us(&self) -> u64 {
        self.window.last_access_us()
    }

    /// Renews the activity window without mutating storage. Called from the
    /// protocol handler's read path; a single clock read and an atomic store,
    /// safe at interrupt-like priority.
    pub fn renew_access(&self) {
        self.window.record_access(self.clock.now_us());
    }

    /// Snapshots and clears up to `max` dirty pages, oldest index first, for
    /// the SD writeback task.
    pub fn drain_dirty(&self, max: usize) -> Vec<(u32, Vec<u8>)> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut out = Vec::new();
        let mut from = 0;
        while out.len() < max {
            let Some(page) = inner.dirty.next_dirty(from) else {
                break;
            };
            let offset = page * self.specs.page_size;
            out.push((
                page as u32,
                inner.mem[offset..offset + self.specs.page_size].to_vec(),
            ));
            inner.dirty.clear(page);
            from = page + 1;
        }
        out
    }

    /// Replaces the whole backing image, e.g. after reading a card image off
    /// the SD card. All dirty bits are cleared.
    pub fn load_image(&self, image: &[u8]) -> Result<()> {
        if image.len() > self.specs.card_size {
            return Err(Error::InvalidData);
        }
        let mut guard = self.inner.lock();
        guard.mem[..image.len()].copy_from_slice(image);
        guard.mem[image.len()..].fill(ERASE_FILL);
        guard.dirty.clear_all();
        debug!(bytes = image.len(), "card image loaded");
        Ok(())
    }

    /// Copies the whole backing image out.
    pub fn save_image(&self) -> Vec<u8> {
        self.inner.lock().mem.clone()
    }

    pub fn load_image_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let image = std::fs::read(path)?;
        self.load_image(&image)
    }

    pub fn save_image_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.save_image())?;
        Ok(())
    }
}

impl PageIo for PageStore {
    fn page_erase(&self, page: u32) -> Result<()> {
        if self.out_of_range(page) {
            self.stats
                .out_of_range
                .fetch_add(1, atomic::Ordering::Relaxed);
            return Ok(());
        }
        let now = self.clock.now_us();
        self.window.renew_lockout(now, self.lockout_us);
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let offset = page as usize * self.specs.page_size;
            inner.mem[offset..offset + self.specs.page_size].fill(ERASE_FILL);
            inner.dirty.set(page as usize);
        }
        self.window.record_write(now);
        self.stats.erases.fetch_add(1, atomic::Ordering::Relaxed);
        Ok(())
    }

    fn page_write(&self, page: u32, buf: &[u8]) -> Result<()> {
        if self.out_of_range(page) {
            self.stats
                .out_of_range
                .fetch_add(1, atomic::Ordering::Relaxed);
            return Ok(());
        }
        let now = self.clock.now_us();
        self.window.renew_lockout(now, self.lockout_us);
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let offset = page as usize * self.specs.page_size;
            let len = buf.len().min(self.specs.page_size);
            inner.mem[offset..offset + len].copy_from_slice(&buf[..len]);
            inner.dirty.set(page as usize);
        }
        self.window.record_write(now);
        self.stats.writes.fetch_add(1, atomic::Ordering::Relaxed);
        Ok(())
    }

    fn page_read(&self, page: u32, count: usize, buf: &mut [u8]) -> Result<()> {
        let offset = page as usize * self.specs.page_size;
        let guard = self.inner.lock();
        if offset < self.specs.card_size {
            let n = count
                .min(buf.len())
                .min(self.specs.card_size - offset);
            buf[..n].copy_from_slice(&guard.mem[offset..offset + n]);
        }
        drop(guard);
        self.stats.reads.fetch_add(1, atomic::Ordering::Relaxed);
        Ok(())
    }
}
