//! Counter-to-increment accounting tests.

use torrent_quota::usage::accountant::{incremental_usage, record_usage};
use torrent_quota::usage::calendar::AccountingDate;
use torrent_quota::usage::ledger::UsageLedger;

fn ledger_with_counter(counter: u64) -> UsageLedger {
    let mut ledger = UsageLedger::new();
    ledger.set_last_observed_counter(counter);
    ledger
}

#[test]
fn unknown_baseline_attributes_nothing() {
    let mut ledger = ledger_with_counter(0);
    assert_eq!(incremental_usage(&mut ledger, 500), 0);
    assert_eq!(ledger.last_observed_counter(), 500);
    assert_eq!(ledger.unknown_baseline_cycles(), 1);
}

#[test]
fn growth_is_the_difference() {
    let mut ledger = ledger_with_counter(1000);
    assert_eq!(incremental_usage(&mut ledger, 1500), 500);
    assert_eq!(ledger.last_observed_counter(), 1500);
    assert_eq!(ledger.unknown_baseline_cycles(), 0);
}

#[test]
fn unchanged_counter_is_zero_usage() {
    let mut ledger = ledger_with_counter(1000);
    assert_eq!(incremental_usage(&mut ledger, 1000), 0);
    assert_eq!(ledger.last_observed_counter(), 1000);
}

#[test]
fn counter_reset_counts_the_whole_reading() {
    let mut ledger = ledger_with_counter(1500);
    assert_eq!(incremental_usage(&mut ledger, 200), 200);
    assert_eq!(ledger.last_observed_counter(), 200);
}

#[test]
fn unknown_baseline_counter_accumulates() {
    let mut ledger = UsageLedger::new();
    incremental_usage(&mut ledger, 0);
    incremental_usage(&mut ledger, 0);
    assert_eq!(ledger.unknown_baseline_cycles(), 2);

    incremental_usage(&mut ledger, 10);
    assert_eq!(ledger.unknown_baseline_cycles(), 3);
    incremental_usage(&mut ledger, 25);
    assert_eq!(ledger.unknown_baseline_cycles(), 3);
}

#[test]
fn record_usage_appends_to_the_date() {
    let date = AccountingDate {
        year: 2024,
        month: 9,
        day: 12,
        hour: 14,
        minute: 5,
    };
    let mut ledger = ledger_with_counter(100);

    assert_eq!(record_usage(&mut ledger, &date, 160), 60);
    assert_eq!(record_usage(&mut ledger, &date, 160), 0);

    assert_eq!(ledger.day_entries(2024, 9, 12), &[60, 0]);
    assert_eq!(ledger.last_observed_counter(), 160);
}
