//! Conversion of cumulative counter readings into incremental usage.

use tracing::{debug, info};

use super::calendar::AccountingDate;
use super::ledger::UsageLedger;

/// Bytes used since the previous reading, updating the stored counter.
///
/// - An unknown baseline (`0`) attributes nothing, so a first run or a run
///   after an outage never books the client's lifetime total as one sample.
/// - A reading below the baseline means the client reset its statistics;
///   the whole reading is usage since that reset.
///
/// The ledger's counter is set to `current` on every path.
pub fn incremental_usage(ledger: &mut UsageLedger, current: u64) -> u64 {
    let last = ledger.last_observed_counter();
    let delta = if last == 0 {
        ledger.note_unknown_baseline();
        info!(
            current,
            occurrences = ledger.unknown_baseline_cycles(),
            "no usage baseline, attributing zero usage"
        );
        0
    } else if current >= last {
        current.saturating_sub(last)
    } else {
        info!(last, current, "cumulative counter reset detected");
        current
    };

    ledger.set_last_observed_counter(current);
    delta
}

/// Compute the incremental usage for `current` and append it to `date`.
pub fn record_usage(ledger: &mut UsageLedger, date: &AccountingDate, current: u64) -> u64 {
    let delta = incremental_usage(ledger, current);
    ledger.append(date.year, date.month, date.day, delta);
    debug!(
        delta,
        counter = current,
        year = date.year,
        month = date.month,
        day = date.day,
        "usage recorded"
    );
    delta
}
