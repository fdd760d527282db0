//! Invocation wrappers around the controller.
//!
//! One scheduled invocation loads the ledger, connects, runs a cycle and
//! persists the ledger again, whatever the cycle's outcome.

use std::future::Future;

use tracing::error;

use crate::controller::{self, CycleContext, CycleError, CycleReport};
use crate::transport::{Transport, TransportError};
use crate::usage::ledger::{LedgerError, LedgerStore};

/// Run one scheduled cycle and persist the ledger on every exit path.
///
/// `connect` is only called after the ledger has been opened, so a failed
/// connection still writes back the ledger (including the current day's
/// key).
///
/// # Errors
///
/// Returns the cycle's [`CycleError`]; a persistence failure takes
/// precedence over a cycle error, which is logged instead.
pub async fn run_scheduled<T, F, Fut>(
    store: &LedgerStore,
    ctx: &CycleContext,
    connect: F,
) -> Result<CycleReport, CycleError>
where
    T: Transport,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut ledger = store.open(&ctx.date)?;

    let outcome = match connect().await {
        Ok(transport) => controller::run_cycle(&transport, &mut ledger, ctx).await,
        Err(e) => Err(CycleError::TransportUnavailable(e)),
    };

    settle(outcome, ledger.close())
}

fn settle(
    outcome: Result<CycleReport, CycleError>,
    persisted: Result<(), LedgerError>,
) -> Result<CycleReport, CycleError> {
    match (outcome, persisted) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(e)) => Err(CycleError::Persistence(e)),
        (Err(cycle), Err(e)) => {
            error!(error = %cycle, "cycle failed before ledger persistence failed");
            Err(CycleError::Persistence(e))
        }
    }
}

/// Read-only view of the month so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageStatus {
    /// Usage booked today.
    pub usage_today: u64,
    /// Usage booked this month.
    pub usage_this_month: u64,
    /// Prorated cap for today.
    pub daily_cap_bytes: u64,
    /// Cap for the month.
    pub monthly_cap_bytes: u64,
    /// Last cumulative counter read from the client.
    pub last_observed_counter: u64,
}

/// Summarise the ledger for `ctx` without modifying it.
///
/// # Errors
///
/// Returns [`LedgerError`] if the ledger cannot be loaded.
pub fn usage_status(store: &LedgerStore, ctx: &CycleContext) -> Result<UsageStatus, LedgerError> {
    let ledger = store.load()?;
    let date = &ctx.date;
    Ok(UsageStatus {
        usage_today: ledger.day_total(date.year, date.month, date.day),
        usage_this_month: ledger.month_total(date.year, date.month),
        daily_cap_bytes: ctx.budgets.daily_cap_bytes,
        monthly_cap_bytes: ctx.budgets.monthly_cap_bytes,
        last_observed_counter: ledger.last_observed_counter(),
    })
}
