//! Virtual memory card core.
//!
//! Storage virtualization and launch-history tracking for a console memory
//! card emulated on embedded hardware: a RAM-backed page store the card
//! protocol handler writes through at time-critical priority, and a
//! background engine that notices when the console's launch-history files
//! changed and reports which game was started.

pub mod clock;
pub mod config;
pub mod error;
pub mod fs;
pub mod history;
pub mod logging;
pub mod notify;
pub mod store;
pub mod title_id;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{CardSpecs, TrackerConfig};
pub use error::{Error, Result};
pub use fs::{CardFs, FileAttr, MemCardFs};
pub use history::HistoryTracker;
pub use notify::GameIdCell;
pub use store::{PageIo, PageStore};
