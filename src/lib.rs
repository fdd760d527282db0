//! torrent-quota: daily and monthly transfer caps for a Transmission client.
//!
//! Run periodically (e.g. every 5 minutes). Each run reads the client's
//! cumulative byte counters, books the increment in a JSON ledger, stops all
//! torrents once month-to-date usage passes the prorated daily cap or the
//! monthly cap, and starts them again in the first minutes of a new day.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration loading and validation.
pub mod config;
/// Per-cycle decisions against the torrent client.
pub mod controller;
/// Log subscriber setup.
pub mod logging;
/// Invocation wrappers that own ledger persistence.
pub mod runner;
/// Torrent client abstraction and the Transmission RPC client.
pub mod transport;
/// Budgets, ledger and usage accounting.
pub mod usage;
