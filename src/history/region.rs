//! Per-region bookkeeping and the mount/run lifecycle.

use super::scanner;
use super::scheduler::ChangeScheduler;
use super::{
    history_path, icon_path, icons, systemdata_dir, HISTORY_ENTRY_COUNT, HISTORY_FILE_SIZE,
    HISTORY_ICON_SIZE, REGION_TAGS,
};
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::fs::{CardFs, Fd, FileAttr};
use crate::notify::GameIdCell;
use crate::store::PageStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One locale region's tracking state. Lives from mount to unmount.
pub struct RegionState {
    pub(crate) tag: char,
    /// Backing cluster of the history file; set during mount bootstrap and
    /// never mutated afterward.
    pub(crate) cluster: Option<u32>,
    pub(crate) refresh_pending: AtomicBool,
    pub(crate) baseline: [u8; HISTORY_ENTRY_COUNT],
}

impl RegionState {
    pub fn new(tag: char) -> Self {
        RegionState {
            tag,
            cluster: None,
            refresh_pending: AtomicBool::new(false),
            baseline: [0; HISTORY_ENTRY_COUNT],
        }
    }

    pub fn tag(&self) -> char {
        self.tag
    }

    pub fn cluster(&self) -> Option<u32> {
        self.cluster
    }

    pub fn is_refresh_pending(&self) -> bool {
        self.refresh_pending.load(Ordering::Acquire)
    }
}

/// Owner of the four region states, the scan scheduler, and the checksum
/// baselines. Constructed when a card becomes active, dropped at unmount;
/// remounting a card builds a fresh tracker.
pub struct HistoryTracker {
    regions: [RegionState; REGION_TAGS.len()],
    scheduler: ChangeScheduler,
    clock: Arc<dyn Clock>,
}

impl HistoryTracker {
    /// Bootstraps all regions against a freshly mounted card. Per-region
    /// failures degrade that region's tracking; they never fail the mount.
    pub fn mount(fs: &mut dyn CardFs, config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let mut regions = REGION_TAGS.map(RegionState::new);
        for region in &mut regions {
            bootstrap_region(fs, region);
        }
        info!("history tracking armed for {} regions", regions.len());
        HistoryTracker {
            regions,
            scheduler: ChangeScheduler::new(config.write_hysteresis_us),
            clock,
        }
    }

    pub fn regions(&self) -> &[RegionState] {
        &self.regions
    }

    /// Page-write-completion notification from the protocol layer. Marks the
    /// region whose history file occupies the written cluster as needing a
    /// refresh. Cheap enough for interrupt-like contexts: a shift and four
    /// compares, no locks.
    pub fn register_page_write(&self, page: u32) {
        let cluster = page / crate::config::PAGES_PER_CLUSTER;
        for region in &self.regions {
            if region.cluster == Some(cluster) {
                region.refresh_pending.store(true, Ordering::Release);
            }
        }
    }

    /// Scheduler tick, to be called from the host's main loop. Once write
    /// activity has been quiet past the hysteresis window, rescans every
    /// refresh-pending region and publishes changed identifiers into `sink`.
    pub fn run(&mut self, fs: &mut dyn CardFs, store: &PageStore, sink: &GameIdCell) {
        let now = self.clock.now_us();
        let write_active = store.take_write_activity() || store.is_locked_out(now);
        if !self
            .scheduler
            .tick(now, write_active, store.last_access_us())
        {
            return;
        }

        for region in &mut self.regions {
            if !region.refresh_pending.load(Ordering::Acquire) {
                continue;
            }
            if !fs.dir_exists(&systemdata_dir(region.tag)) || !fs.file_exists(&history_path(region.tag))
            {
                debug!(region = %region.tag, "backing files gone, dropping refresh");
                region.refresh_pending.store(false, Ordering::Release);
                continue;
            }
            match scanner::rescan(fs, region) {
                Ok(changes) => {
                    for change in changes {
                        info!(region = %region.tag, slot = change.slot, id = %change.title_id,
                            "game launch detected");
                        sink.set(change.title_id);
                    }
                    region.refresh_pending.store(false, Ordering::Release);
                }
                // Flag stays set; the next quiet window retries.
                Err(e) => warn!(region = %region.tag, error = %e, "rescan failed, will retry"),
            }
        }
    }
}

/// Ensures a region's system directory, history file, and icon exist, and
/// captures the history file's cluster and checksum baseline. Idempotent:
/// rerunning against a bootstrapped card changes no file content.
fn bootstrap_region(fs: &mut dyn CardFs, region: &mut RegionState) {
    let dir = systemdata_dir(region.tag);
    if !fs.dir_exists(&dir) {
        if let Err(e) = fs.mkdir(&dir) {
            warn!(region = %region.tag, error = %e, "failed to create system directory");
            region.refresh_pending.store(true, Ordering::Release);
            return;
        }
        debug!(region = %region.tag, dir = %dir, "created system directory");
    }

    let path = history_path(region.tag);
    let bootstrapped = if fs.file_exists(&path) {
        read_existing_history(fs, region, &path)
    } else {
        create_empty_history(fs, region, &path)
    };
    match bootstrapped {
        Ok(()) => {
            debug!(region = %region.tag, cluster = ?region.cluster, "history file tracked")
        }
        Err(e) => {
            warn!(region = %region.tag, error = %e, "history bootstrap failed");
            region.refresh_pending.store(true, Ordering::Release);
        }
    }

    inject_icon(fs, region.tag);
}

fn read_existing_history(fs: &mut dyn CardFs, region: &mut RegionState, path: &str) -> Result<()> {
    let fd = fs.open(path, FileAttr::READABLE)?;
    let mut buf = [0u8; HISTORY_FILE_SIZE];
    let read = fs.read(fd, &mut buf);
    let cluster = fs.cluster_of(fd);
    fs.close(fd)?;
    read?;
    region.baseline = scanner::read_slots(&buf);
    region.cluster = Some(cluster?);
    Ok(())
}

fn create_empty_history(fs: &mut dyn CardFs, region: &mut RegionState, path: &str) -> Result<()> {
    let fd = fs.open(path, FileAttr::WRITABLE | FileAttr::CREATE)?;
    let write = fs.write(fd, &[0u8; HISTORY_FILE_SIZE]);
    fs.close(fd)?;
    write?;

    // Reopen to learn where the filesystem placed it
    let fd = fs.open(path, FileAttr::READABLE)?;
    let cluster = fs.cluster_of(fd);
    fs.close(fd)?;
    region.cluster = Some(cluster?);
    region.baseline = [0; HISTORY_ENTRY_COUNT];
    Ok(())
}

/// Writes the region's embedded icon payload, zero-padded to the fixed icon
/// file size. No-op once the file exists.
fn inject_icon(fs: &mut dyn CardFs, tag: char) {
    let path = icon_path(tag);
    if fs.file_exists(&path) {
        debug!(icon = %path, "icon already present");
        return;
    }

    let fd = match fs.open(&path, FileAttr::WRITABLE | FileAttr::CREATE) {
        Ok(fd) => fd,
        Err(e) => {
            warn!(icon = %path, error = %e, "failed to create icon file");
            return;
        }
    };
    if let Err(e) = write_icon_payload(fs, fd, icons::payload_for(tag)) {
        warn!(icon = %path, error = %e, "failed to write icon payload");
    }
    if let Err(e) = fs.close(fd) {
        warn!(icon = %path, error = %e, "failed to close icon file");
    }
}

fn write_icon_payload(fs: &mut dyn CardFs, fd: Fd, payload: &[u8]) -> Result<()> {
    let mut remaining = HISTORY_ICON_SIZE;
    remaining = remaining.saturating_sub(fs.write(fd, payload)?);

    let zeros = [0u8; 128];
    while remaining > 0 {
        let n = fs.write(fd, &zeros[..remaining.min(zeros.len())])?;
        if n == 0 {
            break;
        }
        remaining -= n;
    }
    Ok(())
}
