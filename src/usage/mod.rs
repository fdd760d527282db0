//! Usage accounting core.
//!
//! - [`calendar`]: monthly and prorated daily caps
//! - [`ledger`]: durable per-day usage samples
//! - [`accountant`]: counter readings to incremental usage
//! - [`limits`]: month-to-date totals against the caps

pub mod accountant;
pub mod calendar;
pub mod ledger;
pub mod limits;

pub use calendar::{compute_budgets, AccountingDate, Budgets};
pub use ledger::{LedgerError, LedgerStore, OpenLedger, UsageLedger};
pub use limits::{CapKind, LimitDecision};
