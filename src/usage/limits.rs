//! Month-to-date usage checks against the calendar budgets.
//!
//! Both caps are compared against the month-to-date total. The daily cap is
//! therefore a cumulative pace limit ("no more than the prorated share of the
//! month so far"), not a limit on today's usage alone.

use tracing::{info, warn};

use super::calendar::{AccountingDate, Budgets, BYTES_PER_GIB};
use super::ledger::UsageLedger;

/// Which cap a month-to-date total breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    /// The prorated daily cap.
    Daily,
    /// The full monthly cap.
    Monthly,
}

impl CapKind {
    /// Human-readable label for logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

/// Result of comparing month-to-date usage against the budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDecision {
    /// Sum of every sample recorded this month.
    pub usage_this_month: u64,
    /// The first cap found breached, daily checked before monthly.
    pub breached: Option<CapKind>,
}

impl LimitDecision {
    /// Whether any cap is strictly exceeded.
    pub fn is_over_limit(&self) -> bool {
        self.breached.is_some()
    }
}

/// Compare usage for `date`'s month against `budgets` and log the outcome.
///
/// Over limit means strictly greater than a cap; landing exactly on a cap is
/// still within budget.
pub fn evaluate(ledger: &UsageLedger, date: &AccountingDate, budgets: &Budgets) -> LimitDecision {
    let usage_this_month = ledger.month_total(date.year, date.month);

    let breached = if usage_this_month > budgets.daily_cap_bytes {
        Some(CapKind::Daily)
    } else if usage_this_month > budgets.monthly_cap_bytes {
        Some(CapKind::Monthly)
    } else {
        None
    };

    match breached {
        Some(cap) => warn!(
            severity = "notice",
            cap = cap.label(),
            usage_bytes = usage_this_month,
            "over {} cap",
            cap.label()
        ),
        None => info!(
            daily_remaining_gib = headroom_gib(budgets.daily_cap_bytes, usage_this_month),
            monthly_remaining_gib = headroom_gib(budgets.monthly_cap_bytes, usage_this_month),
            "within transfer caps"
        ),
    }

    LimitDecision {
        usage_this_month,
        breached,
    }
}

/// Tuple form of [`evaluate`]: `(over_limit, usage_this_month)`.
pub fn is_over_limit(
    ledger: &UsageLedger,
    year: i32,
    month: u32,
    day: u32,
    daily_cap: u64,
    monthly_cap: u64,
) -> (bool, u64) {
    let date = AccountingDate {
        year,
        month,
        day,
        hour: 0,
        minute: 0,
    };
    let budgets = Budgets {
        monthly_cap_bytes: monthly_cap,
        daily_cap_bytes: daily_cap,
    };
    let decision = evaluate(ledger, &date, &budgets);
    (decision.is_over_limit(), decision.usage_this_month)
}

/// End-of-cycle summary of where the month stands.
pub fn log_usage_summary(usage_this_month: u64, budgets: &Budgets) {
    if usage_this_month >= budgets.monthly_cap_bytes {
        info!(
            monthly_remaining_gib = headroom_gib(budgets.monthly_cap_bytes, usage_this_month),
            "monthly cap exceeded"
        );
    } else {
        info!(
            daily_remaining_gib = headroom_gib(budgets.daily_cap_bytes, usage_this_month),
            monthly_remaining_gib = headroom_gib(budgets.monthly_cap_bytes, usage_this_month),
            "usage summary"
        );
    }
}

/// Signed headroom in GiB; negative once the cap is exceeded.
pub fn headroom_gib(cap: u64, used: u64) -> f64 {
    let diff = i128::from(cap).saturating_sub(i128::from(used));
    #[allow(clippy::cast_precision_loss)]
    {
        diff as f64 / BYTES_PER_GIB as f64
    }
}
