//! Card geometry and tracker configuration.
//!
//! `CardSpecs` mirrors what the card protocol layer negotiates with the
//! console; `TrackerConfig` tunes the history engine. Both serialize so the
//! host can persist its card settings next to the card images.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ECC bytes are carried per page.
pub const CARD_FLAG_ECC: u8 = 0x08;
/// The card advertises bad-block management.
pub const CARD_FLAG_BAD_BLOCKS: u8 = 0x10;

/// Pages per allocation cluster of the card filesystem.
pub const PAGES_PER_CLUSTER: u32 = 2;

/// Physical geometry of the emulated card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpecs {
    /// Page size in bytes
    pub page_size: usize,

    /// Pages per erase block
    pub block_size: usize,

    /// Current addressable card size in bytes
    pub card_size: usize,

    /// Card capability flags reported to the console
    pub flags: u8,
}

impl Default for CardSpecs {
    fn default() -> Self {
        CardSpecs {
            page_size: 512,
            block_size: 16,
            card_size: 8 * 1024 * 1024,
            flags: CARD_FLAG_ECC | CARD_FLAG_BAD_BLOCKS,
        }
    }
}

impl CardSpecs {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(Error::ConfigError(format!(
                "page_size must be a nonzero power of two, got {}",
                self.page_size
            )));
        }
        if self.block_size == 0 {
            return Err(Error::ConfigError("block_size must be nonzero".into()));
        }
        if self.card_size == 0 || self.card_size % self.page_size != 0 {
            return Err(Error::ConfigError(format!(
                "card_size {} is not a multiple of page_size {}",
                self.card_size, self.page_size
            )));
        }
        Ok(())
    }

    /// Number of addressable pages.
    pub fn pages(&self) -> usize {
        self.card_size / self.page_size
    }

    /// Allocation cluster containing the given page.
    pub fn cluster_of_page(&self, page: u32) -> u32 {
        page / PAGES_PER_CLUSTER
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let specs: CardSpecs = serde_json::from_str(&raw)
            .map_err(|e| Error::SerializationError(format!("Failed to parse card specs: {}", e)))?;
        specs.validate()?;
        Ok(specs)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| Error::SerializationError(format!("Failed to encode card specs: {}", e)))?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// History engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Idle time after write activity before a scan may run, in microseconds
    pub write_hysteresis_us: u64,

    /// How long a lockout renewal defers background consumers, in microseconds
    pub lockout_us: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            write_hysteresis_us: 2_000_000,
            lockout_us: 100_000,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.write_hysteresis_us == 0 {
            return Err(Error::ConfigError(
                "write_hysteresis_us must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_specs_are_valid() {
        let specs = CardSpecs::default();
        specs.validate().unwrap();
        assert_eq!(specs.pages(), 16384);
        assert_eq!(specs.cluster_of_page(7), 3);
    }

    #[test]
    fn rejects_bad_geometry() {
        let specs = CardSpecs {
            page_size: 500,
            ..CardSpecs::default()
        };
        assert!(specs.validate().is_err());

        let specs = CardSpecs {
            card_size: 1000,
            ..CardSpecs::default()
        };
        assert!(specs.validate().is_err());
    }

    #[test]
    fn specs_round_trip_through_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("card.json");

        let specs = CardSpecs {
            card_size: 1024 * 1024,
            ..CardSpecs::default()
        };
        specs.to_json_file(&path).unwrap();

        let loaded = CardSpecs::from_json_file(&path).unwrap();
        assert_eq!(loaded, specs);
    }
}
