//! Month-to-date limit evaluation tests.

use torrent_quota::usage::calendar::{AccountingDate, Budgets, BYTES_PER_GIB};
use torrent_quota::usage::ledger::UsageLedger;
use torrent_quota::usage::limits::{evaluate, is_over_limit, CapKind};

const GIB: u64 = BYTES_PER_GIB;

fn date(day: u32) -> AccountingDate {
    AccountingDate {
        year: 2024,
        month: 4,
        day,
        hour: 9,
        minute: 0,
    }
}

fn budgets(daily: u64, monthly: u64) -> Budgets {
    Budgets {
        monthly_cap_bytes: monthly,
        daily_cap_bytes: daily,
    }
}

#[test]
fn landing_exactly_on_the_cap_is_within_budget() {
    let mut ledger = UsageLedger::new();
    ledger.append(2024, 4, 1, GIB);

    let decision = evaluate(&ledger, &date(1), &budgets(GIB, 30 * GIB));
    assert!(!decision.is_over_limit());
    assert_eq!(decision.usage_this_month, GIB);

    ledger.append(2024, 4, 1, 1);
    let decision = evaluate(&ledger, &date(1), &budgets(GIB, 30 * GIB));
    assert_eq!(decision.breached, Some(CapKind::Daily));
}

#[test]
fn daily_cap_is_checked_against_month_to_date() {
    let mut ledger = UsageLedger::new();
    // Nothing today, but earlier days already used more than two days' share.
    ledger.append(2024, 4, 1, 2 * GIB);
    ledger.append(2024, 4, 2, GIB);
    ledger.ensure_day(2024, 4, 3);

    let decision = evaluate(&ledger, &date(3), &budgets(2 * GIB, 30 * GIB));
    assert_eq!(decision.usage_this_month, 3 * GIB);
    assert_eq!(decision.breached, Some(CapKind::Daily));
}

#[test]
fn monthly_breach_reported_when_daily_is_not() {
    let mut ledger = UsageLedger::new();
    ledger.append(2024, 4, 30, 5 * GIB);

    // Unusual but possible when the caps are supplied directly.
    let decision = evaluate(&ledger, &date(30), &budgets(10 * GIB, 4 * GIB));
    assert_eq!(decision.breached, Some(CapKind::Monthly));
}

#[test]
fn other_months_do_not_count() {
    let mut ledger = UsageLedger::new();
    ledger.append(2024, 3, 31, 100 * GIB);
    ledger.append(2023, 4, 1, 100 * GIB);
    ledger.append(2024, 4, 1, GIB / 2);

    let decision = evaluate(&ledger, &date(1), &budgets(GIB, 30 * GIB));
    assert!(!decision.is_over_limit());
    assert_eq!(decision.usage_this_month, GIB / 2);
}

#[test]
fn tuple_form_matches_evaluate() {
    let mut ledger = UsageLedger::new();
    ledger.append(2024, 4, 1, 3 * GIB);

    assert_eq!(
        is_over_limit(&ledger, 2024, 4, 1, GIB, 30 * GIB),
        (true, 3 * GIB)
    );
    assert_eq!(
        is_over_limit(&ledger, 2024, 4, 5, 5 * GIB, 30 * GIB),
        (false, 3 * GIB)
    );
}
