//! Durable usage ledger.
//!
//! The ledger holds the last cumulative counter read from the client and an
//! append-only list of incremental samples per `(year, month, day)`. It is
//! stored as one pretty-printed JSON document:
//!
//! ```json
//! { "lastUsage": 123, "unknownBaselineCycles": 0, "data": { "2024": { "3": { "15": [0, 512] } } } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::calendar::AccountingDate;

type DayMap = BTreeMap<u32, Vec<u64>>;
type MonthMap = BTreeMap<u32, DayMap>;

/// Errors raised while loading or persisting the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger file exists but could not be read.
    #[error("failed to read ledger at {}: {source}", path.display())]
    Read {
        /// Ledger file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The ledger file is not a valid ledger document.
    #[error("failed to parse ledger at {}: {source}", path.display())]
    Parse {
        /// Ledger file path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The ledger could not be serialized.
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Writing or renaming the ledger file failed.
    #[error("failed to write ledger at {}: {source}", path.display())]
    Write {
        /// Path that was being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Per-day incremental usage plus the last observed cumulative counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    /// Last cumulative byte count read from the client. Zero means unknown.
    #[serde(rename = "lastUsage", default)]
    last_usage: u64,

    /// Cycles that attributed zero usage because the baseline was unknown.
    #[serde(rename = "unknownBaselineCycles", default)]
    unknown_baseline_cycles: u64,

    /// Year -> month -> day -> samples in insertion order.
    #[serde(default)]
    data: BTreeMap<i32, MonthMap>,
}

impl UsageLedger {
    /// Create an empty ledger with an unknown baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last cumulative counter read from the client (`0` = unknown).
    pub fn last_observed_counter(&self) -> u64 {
        self.last_usage
    }

    /// Replace the last observed cumulative counter.
    pub fn set_last_observed_counter(&mut self, counter: u64) {
        self.last_usage = counter;
    }

    /// Number of cycles that found no usable baseline.
    pub fn unknown_baseline_cycles(&self) -> u64 {
        self.unknown_baseline_cycles
    }

    pub(crate) fn note_unknown_baseline(&mut self) {
        self.unknown_baseline_cycles = self.unknown_baseline_cycles.saturating_add(1);
    }

    /// Get the sample list for a day, creating empty year/month/day levels
    /// as needed.
    pub fn ensure_day(&mut self, year: i32, month: u32, day: u32) -> &mut Vec<u64> {
        self.data
            .entry(year)
            .or_default()
            .entry(month)
            .or_default()
            .entry(day)
            .or_default()
    }

    /// Append one incremental sample to a day.
    pub fn append(&mut self, year: i32, month: u32, day: u32, delta: u64) {
        self.ensure_day(year, month, day).push(delta);
    }

    /// Samples recorded for a day, oldest first. Empty if the day is unknown.
    pub fn day_entries(&self, year: i32, month: u32, day: u32) -> &[u64] {
        self.data
            .get(&year)
            .and_then(|months| months.get(&month))
            .and_then(|days| days.get(&day))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Sum of a day's samples.
    pub fn day_total(&self, year: i32, month: u32, day: u32) -> u64 {
        sum_entries(self.day_entries(year, month, day))
    }

    /// Sum of every sample recorded in a month.
    pub fn month_total(&self, year: i32, month: u32) -> u64 {
        self.data
            .get(&year)
            .and_then(|months| months.get(&month))
            .map_or(0, |days| {
                days.values()
                    .fold(0u64, |acc, entries| acc.saturating_add(sum_entries(entries)))
            })
    }
}

fn sum_entries(entries: &[u64]) -> u64 {
    entries.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
}

/// File-backed storage for a [`UsageLedger`].
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Store backed by the JSON document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. A missing file yields an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] or [`LedgerError::Parse`] when the file
    /// exists but is unreadable or malformed.
    pub fn load(&self) -> Result<UsageLedger, LedgerError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| LedgerError::Parse {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no ledger found, starting empty");
                Ok(UsageLedger::new())
            }
            Err(source) => Err(LedgerError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Persist the ledger atomically.
    ///
    /// Writes a sibling `.json.tmp` file, syncs it, then renames it over the
    /// ledger so readers never observe a partial document.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Serialize`] or [`LedgerError::Write`].
    pub fn save(&self, ledger: &UsageLedger) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(ledger).map_err(LedgerError::Serialize)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write_tmp().map_err(|source| LedgerError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        fs::rename(&tmp_path, &self.path).map_err(|source| LedgerError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "ledger saved");
        Ok(())
    }

    /// Load the ledger for one invocation and make sure `date`'s day exists.
    ///
    /// # Errors
    ///
    /// Propagates [`LedgerStore::load`] errors.
    pub fn open(&self, date: &AccountingDate) -> Result<OpenLedger, LedgerError> {
        let mut ledger = self.load()?;
        ledger.ensure_day(date.year, date.month, date.day);
        Ok(OpenLedger {
            store: self.clone(),
            ledger,
            closed: false,
        })
    }
}

/// A ledger loaded for the duration of one invocation.
///
/// [`OpenLedger::close`] persists and reports failures. If the guard is
/// dropped without being closed it persists on drop and logs any failure.
#[derive(Debug)]
pub struct OpenLedger {
    store: LedgerStore,
    ledger: UsageLedger,
    closed: bool,
}

impl OpenLedger {
    /// Persist the ledger and release the guard.
    ///
    /// # Errors
    ///
    /// Returns the [`LedgerStore::save`] error.
    pub fn close(mut self) -> Result<(), LedgerError> {
        self.closed = true;
        self.store.save(&self.ledger)
    }
}

impl Deref for OpenLedger {
    type Target = UsageLedger;

    fn deref(&self) -> &UsageLedger {
        &self.ledger
    }
}

impl DerefMut for OpenLedger {
    fn deref_mut(&mut self) -> &mut UsageLedger {
        &mut self.ledger
    }
}

impl Drop for OpenLedger {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.store.save(&self.ledger) {
            error!(error = %e, "failed to persist ledger on drop");
        }
    }
}
