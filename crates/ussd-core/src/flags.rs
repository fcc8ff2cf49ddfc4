//! Symbolic flag names
//!
//! Menu definitions and handlers refer to condition bits by name
//! (`flag_account_created`), while the session state stores plain bit
//! positions. The [`FlagTable`] is the bridge between the two: it is loaded
//! once at startup from a CSV resource and never mutated afterwards.
//!
//! Rows have the shape `kind,name,value`. Only rows whose kind is `flag` are
//! consumed; anything else is skipped.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

/// Row kind consumed by the loader
const FLAG_ROW_KIND: &str = "flag";

/// Highest bit position a table may define
pub const MAX_FLAG_BIT: u32 = 1023;

/// Immutable name → bit mapping
#[derive(Debug, Clone, Default)]
pub struct FlagTable {
    by_name: HashMap<String, u32>,
    by_bit: BTreeMap<u32, String>,
}

impl FlagTable {
    /// Parse a flag table from a buffered reader.
    ///
    /// Rows of the wrong shape are skipped. A row whose value is not a
    /// number or exceeds [`MAX_FLAG_BIT`], or whose name or bit is already
    /// taken, is skipped with a warning. Only a failure to read the source is fatal.
    pub fn load(source: impl BufRead) -> Result<Self> {
        let mut table = Self::default();

        for (idx, line) in source.lines().enumerate() {
            let line = line.map_err(|e| Error::Parse(format!("flag source line {}: {}", idx + 1, e)))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 3 || fields[0] != FLAG_ROW_KIND {
                debug!(line = idx + 1, "Skipping non-flag row");
                continue;
            }

            let (name, value) = (fields[1], fields[2]);
            let bit: u32 = match value.parse() {
                Ok(bit) => bit,
                Err(e) => {
                    warn!(line = idx + 1, name = %name, value = %value, error = %e, "Invalid flag value, row skipped");
                    continue;
                }
            };

            if bit > MAX_FLAG_BIT {
                warn!(line = idx + 1, name = %name, bit, max = MAX_FLAG_BIT, "Flag bit out of range, row skipped");
                continue;
            }

            if table.by_name.contains_key(name) {
                warn!(line = idx + 1, name = %name, "Duplicate flag name, row skipped");
                continue;
            }
            if let Some(existing) = table.by_bit.get(&bit) {
                warn!(line = idx + 1, name = %name, bit, existing = %existing, "Duplicate flag bit, row skipped");
                continue;
            }

            table.by_name.insert(name.to_string(), bit);
            table.by_bit.insert(bit, name.to_string());
        }

        info!(count = table.len(), "Flag table loaded");
        Ok(table)
    }

    /// Load from a file on disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Parse(format!("cannot open flag table {}: {}", path.display(), e)))?;
        Self::load(std::io::BufReader::new(file))
    }

    /// Resolve a flag name to its bit position
    pub fn resolve(&self, name: &str) -> Result<u32> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownFlag(name.to_string()))
    }

    /// Reverse lookup, mostly for logging
    #[must_use]
    pub fn name_of(&self, bit: u32) -> Option<&str> {
        self.by_bit.get(&bit).map(String::as_str)
    }

    /// Number of flags defined
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Highest bit in use, if any
    #[must_use]
    pub fn max_bit(&self) -> Option<u32> {
        self.by_bit.keys().next_back().copied()
    }

    /// Iterate `(name, bit)` pairs in bit order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_bit.iter().map(|(bit, name)| (name.as_str(), *bit))
    }
}

impl std::str::FromStr for FlagTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::load(s.as_bytes())
    }
}

/// Growable bit set holding a session's condition flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagBits(Vec<u8>);

impl FlagBits {
    /// Set a bit, growing the storage as needed.
    /// Returns whether the bit changed.
    pub fn set(&mut self, bit: u32) -> bool {
        let (byte, mask) = Self::locate(bit);
        if self.0.len() <= byte {
            self.0.resize(byte + 1, 0);
        }
        let changed = self.0[byte] & mask == 0;
        self.0[byte] |= mask;
        changed
    }

    /// Clear a bit. Returns whether the bit changed.
    pub fn reset(&mut self, bit: u32) -> bool {
        let (byte, mask) = Self::locate(bit);
        match self.0.get_mut(byte) {
            Some(b) if *b & mask != 0 => {
                *b &= !mask;
                true
            }
            _ => false,
        }
    }

    /// Whether a bit is set
    #[must_use]
    pub fn is_set(&self, bit: u32) -> bool {
        let (byte, mask) = Self::locate(bit);
        self.0.get(byte).is_some_and(|b| b & mask != 0)
    }

    /// Clear every bit at or above `from`
    pub fn reset_from(&mut self, from: u32) {
        let total = (self.0.len() * 8) as u32;
        for bit in from..total {
            self.reset(bit);
        }
    }

    /// Set bits in ascending order
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().enumerate().flat_map(|(i, byte)| {
            (0..8u32).filter_map(move |off| (byte & (1 << off) != 0).then_some(i as u32 * 8 + off))
        })
    }

    fn locate(bit: u32) -> (usize, u8) {
        ((bit / 8) as usize, 1u8 << (bit % 8))
    }
}
