//! Frequency-to-voltage tables
//!
//! Each scalable clock carries an ascending table of operating points. The
//! table is validated on construction and immutable afterwards, so lookups
//! need no locking.

use crate::domain::{Khz, Millivolts};
use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single operating point: a clock rate and the minimum voltage it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqVolt {
    /// Clock rate
    pub freq: Khz,
    /// Minimum supply voltage for this rate
    pub volt: Millivolts,
}

impl FreqVolt {
    /// Create a new operating point
    pub const fn new(freq: Khz, volt: Millivolts) -> Self {
        Self { freq, volt }
    }
}

impl fmt::Display for FreqVolt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.freq, self.volt)
    }
}

/// Frequency-to-voltage table sorted by ascending frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FreqVolt>", into = "Vec<FreqVolt>")]
pub struct FreqVoltTable {
    entries: Vec<FreqVolt>,
}

impl FreqVoltTable {
    /// Create a new table from operating points
    ///
    /// Entries are sorted by frequency.
    ///
    /// # Errors
    /// Returns `DomainError::EmptyTable` if `entries` is empty and
    /// `DomainError::DuplicateFrequency` if two entries share a rate
    pub fn new(mut entries: Vec<FreqVolt>) -> Result<Self, DomainError> {
        if entries.is_empty() {
            return Err(DomainError::EmptyTable);
        }

        entries.sort_by_key(|e| e.freq);

        if let Some(pair) = entries.windows(2).find(|w| w[0].freq == w[1].freq) {
            return Err(DomainError::DuplicateFrequency(pair[0].freq));
        }

        Ok(Self { entries })
    }

    /// Build a table from raw (kHz, mV) pairs
    pub fn from_pairs(pairs: &[(u32, u32)]) -> Result<Self, DomainError> {
        Self::new(
            pairs
                .iter()
                .map(|&(khz, mv)| FreqVolt::new(Khz::new(khz), Millivolts::new(mv)))
                .collect(),
        )
    }

    /// Get the voltage required to run at `rate`
    ///
    /// Picks the first entry whose frequency is at or above `rate`, so a rate
    /// between two entries gets the higher entry's voltage.
    ///
    /// # Errors
    /// Returns `DomainError::FrequencyOutOfRange` if `rate` exceeds the
    /// highest entry
    pub fn lookup(&self, rate: Khz) -> Result<Millivolts, DomainError> {
        let idx = self.entries.partition_point(|e| e.freq < rate);
        self.entries
            .get(idx)
            .map(|e| e.volt)
            .ok_or(DomainError::FrequencyOutOfRange {
                rate,
                max: self.max_freq(),
            })
    }

    /// Lowest frequency in the table
    pub fn min_freq(&self) -> Khz {
        self.entries[0].freq
    }

    /// Highest frequency in the table
    pub fn max_freq(&self) -> Khz {
        self.entries[self.entries.len() - 1].freq
    }

    /// Get the table entries
    pub fn entries(&self) -> &[FreqVolt] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tables are never empty; provided for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<FreqVolt>> for FreqVoltTable {
    type Error = DomainError;

    fn try_from(entries: Vec<FreqVolt>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<FreqVoltTable> for Vec<FreqVolt> {
    fn from(table: FreqVoltTable) -> Self {
        table.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_table() -> FreqVoltTable {
        FreqVoltTable::from_pairs(&[(600_000, 950), (800_000, 1050), (1_000_000, 1150)]).unwrap()
    }

    #[test]
    fn test_lookup_exact_entries() {
        let table = cpu_table();
        for entry in table.entries() {
            assert_eq!(table.lookup(entry.freq).unwrap(), entry.volt);
        }
    }

    #[test]
    fn test_lookup_between_entries_rounds_up() {
        let table = cpu_table();
        assert_eq!(table.lookup(Khz::new(700_000)).unwrap().as_mv(), 1050);
        assert_eq!(table.lookup(Khz::new(800_001)).unwrap().as_mv(), 1150);
        assert_eq!(table.lookup(Khz::new(100_000)).unwrap().as_mv(), 950);
    }

    #[test]
    fn test_lookup_above_max() {
        let table = cpu_table();
        let err = table.lookup(Khz::new(1_200_000)).unwrap_err();
        assert_eq!(
            err,
            DomainError::FrequencyOutOfRange {
                rate: Khz::new(1_200_000),
                max: Khz::new(1_000_000),
            }
        );
    }

    #[test]
    fn test_table_sorting() {
        let table =
            FreqVoltTable::from_pairs(&[(1_000_000, 1150), (600_000, 950), (800_000, 1050)])
                .unwrap();
        let freqs: Vec<_> = table.entries().iter().map(|e| e.freq.as_khz()).collect();
        assert_eq!(freqs, vec![600_000, 800_000, 1_000_000]);
        assert_eq!(table.min_freq().as_khz(), 600_000);
        assert_eq!(table.max_freq().as_khz(), 1_000_000);
    }

    #[test]
    fn test_table_empty() {
        assert!(matches!(
            FreqVoltTable::new(vec![]),
            Err(DomainError::EmptyTable)
        ));
    }

    #[test]
    fn test_table_duplicate_frequency() {
        let result = FreqVoltTable::from_pairs(&[(600_000, 950), (600_000, 1000)]);
        assert!(matches!(result, Err(DomainError::DuplicateFrequency(_))));
    }

    #[test]
    fn test_table_deserialize_validates() {
        let json = r#"[{"freq":800000,"volt":1050},{"freq":600000,"volt":950}]"#;
        let table: FreqVoltTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.min_freq().as_khz(), 600_000);

        let empty: Result<FreqVoltTable, _> = serde_json::from_str("[]");
        assert!(empty.is_err());
    }
}
