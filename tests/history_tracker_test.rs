// End-to-end history tracking: protocol writes through the page store,
// history file rewritten through the card filesystem, scan fires after the
// quiet window and publishes the launched title id.
use std::sync::Arc;
use vmc_core::clock::ManualClock;
use vmc_core::fs::FileAttr;
use vmc_core::history::{history_path, HISTORY_FILE_SIZE};
use vmc_core::{CardFs, CardSpecs, GameIdCell, HistoryTracker, MemCardFs, PageIo, PageStore, TrackerConfig};

const HYST_US: u64 = 2_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    fs: MemCardFs,
    store: PageStore,
    tracker: HistoryTracker,
    sink: GameIdCell,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let mut fs = MemCardFs::new();
        let store = PageStore::new(CardSpecs::default(), clock.clone()).unwrap();
        let tracker = HistoryTracker::mount(&mut fs, TrackerConfig::default(), clock.clone());
        Harness {
            clock,
            fs,
            store,
            tracker,
            sink: GameIdCell::new(),
        }
    }

    /// The console launching a game: the filesystem view of the history file
    /// changes, and the protocol layer reports page writes for its cluster.
    fn launch_game(&mut self, tag: char, slot: usize, title: &[u8], launch: &[u8; 6]) {
        let path = history_path(tag);
        let mut file = vec![0u8; HISTORY_FILE_SIZE];
        let base = slot * 22;
        file[base..base + title.len()].copy_from_slice(title);
        file[base + 16..base + 22].copy_from_slice(launch);

        let fd = self.fs.open(&path, FileAttr::WRITABLE).unwrap();
        self.fs.write(fd, &file).unwrap();
        self.fs.close(fd).unwrap();

        let cluster = self.fs.cluster_for_path(&path).unwrap();
        for page in [cluster * 2, cluster * 2 + 1] {
            self.store.page_write(page, &[0u8; 512]).unwrap();
            self.tracker.register_page_write(page);
        }
    }

    fn run(&mut self) {
        self.tracker.run(&mut self.fs, &self.store, &self.sink);
    }
}

#[test]
fn launch_is_reported_after_quiet_window() {
    let mut h = Harness::new();
    h.clock.set(1_000_000);
    h.launch_game('A', 3, b"SLUS_203.12", &[1, 2, 3, 4, 5, 6]);

    // Tick while writes are fresh: latches dirty, no scan yet
    h.clock.advance(10_000);
    h.run();
    assert!(h.sink.take().is_none());

    // Still inside the hysteresis window
    h.clock.advance(HYST_US / 2);
    h.run();
    assert!(h.sink.take().is_none());

    // Quiet past the window: exactly one report
    h.clock.advance(HYST_US);
    h.run();
    assert_eq!(h.sink.take().as_deref(), Some("SLUS_203.12"));

    // Stable until something else changes
    h.clock.advance(HYST_US * 2);
    h.run();
    assert!(h.sink.take().is_none());
}

#[test]
fn sustained_writes_defer_the_scan() {
    let mut h = Harness::new();
    h.clock.set(1_000_000);
    h.launch_game('A', 0, b"SCES_524.12", &[9, 9, 9, 0, 0, 0]);

    // A write stream that never pauses longer than the threshold
    for _ in 0..20 {
        h.clock.advance(HYST_US / 4);
        h.store.page_write(0, &[0u8; 512]).unwrap();
        h.run();
        assert!(h.sink.take().is_none(), "scan fired during active writes");
    }

    // First qualifying pause triggers the report
    h.clock.advance(HYST_US + 200_000);
    h.run();
    assert_eq!(h.sink.take().as_deref(), Some("SCES_524.12"));
}

#[test]
fn writes_to_untracked_clusters_never_trigger_a_scan() {
    let mut h = Harness::new();
    h.clock.set(1_000_000);

    // Heavy traffic far away from any history file
    for page in 4_000..4_032u32 {
        h.store.page_write(page, &[0xAA; 512]).unwrap();
        h.tracker.register_page_write(page);
    }

    h.clock.advance(HYST_US * 2);
    h.run();
    assert!(h.sink.take().is_none());
    for region in h.tracker.regions() {
        assert!(!region.is_refresh_pending());
    }
}

#[test]
fn each_region_reports_independently() {
    let mut h = Harness::new();
    h.clock.set(1_000_000);
    h.launch_game('I', 5, b"SLPS_257.21", &[4, 4, 0, 0, 0, 1]);

    h.clock.advance(10_000);
    h.run();
    h.clock.advance(HYST_US + 100_000);
    h.run();
    assert_eq!(h.sink.take().as_deref(), Some("SLPS_257.21"));

    h.launch_game('E', 1, b"SCES_500.03", &[1, 1, 1, 1, 1, 1]);
    h.clock.advance(10_000);
    h.run();
    h.clock.advance(HYST_US + 100_000);
    h.run();
    assert_eq!(h.sink.take().as_deref(), Some("SCES_500.03"));
}

#[test]
fn garbled_entry_is_dropped_silently() {
    let mut h = Harness::new();
    h.clock.set(1_000_000);
    h.launch_game('A', 2, &[0xFE, 0xFD, 0xFC], &[1, 0, 0, 0, 0, 0]);

    h.clock.advance(10_000);
    h.run();
    h.clock.advance(HYST_US + 100_000);
    h.run();
    assert!(h.sink.take().is_none());

    // The slot settles into a valid id on a later write
    h.launch_game('A', 2, b"SLUS_210.05", &[2, 0, 0, 0, 0, 0]);
    h.clock.advance(10_000);
    h.run();
    h.clock.advance(HYST_US + 100_000);
    h.run();
    assert_eq!(h.sink.take().as_deref(), Some("SLUS_210.05"));
}
