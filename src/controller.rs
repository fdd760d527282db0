//! One accounting cycle against the torrent client.
//!
//! The controller keeps no state between invocations. Each cycle re-derives
//! what to do from the client's live session statistics and the ledger:
//!
//! 1. Read session stats.
//! 2. With active torrents: reannounce downloads, record usage, evaluate the
//!    caps, and stop everything when over.
//! 3. Inside the resume window with nothing active: start everything.
//!
//! Persisting the ledger is the caller's job (see [`crate::runner`]).

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::transport::{Transport, TransportError};
use crate::usage::accountant::record_usage;
use crate::usage::calendar::{compute_budgets, AccountingDate, Budgets};
use crate::usage::ledger::{LedgerError, UsageLedger};
use crate::usage::limits;

/// Where a cycle ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing active and nothing to do.
    Idle,
    /// Usage was recorded and found within the caps.
    CheckingUsage,
    /// A cap was exceeded and every torrent was stopped.
    Throttled,
    /// The resume window was open and every torrent was started.
    Resuming,
}

/// Minutes at the start of an hour during which a resume may happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeWindow {
    /// Hour of the accounting day.
    pub hour: u32,
    /// Minutes `0..minute_threshold` of `hour` are inside the window.
    pub minute_threshold: u32,
}

impl ResumeWindow {
    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: &AccountingDate) -> bool {
        date.hour == self.hour && date.minute < self.minute_threshold
    }
}

impl Default for ResumeWindow {
    fn default() -> Self {
        Self {
            hour: 0,
            minute_threshold: 8,
        }
    }
}

/// Everything a cycle needs to know about "now", computed once per
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleContext {
    /// Reference time in the accounting timezone.
    pub date: AccountingDate,
    /// Caps for `date`.
    pub budgets: Budgets,
    /// When a resume may happen.
    pub resume_window: ResumeWindow,
}

impl CycleContext {
    /// Build the context for `now` from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured timezone offset is invalid.
    pub fn new(now: DateTime<Utc>, config: &Config) -> anyhow::Result<Self> {
        let offset = config.schedule.offset()?;
        let date = AccountingDate::from_utc(now, offset);
        let resume_window = ResumeWindow {
            hour: config.schedule.resume_hour,
            minute_threshold: config.schedule.resume_minute_threshold,
        };
        Ok(Self::from_parts(date, config.cap.monthly_gib, resume_window))
    }

    /// Build the context from an already-shifted date.
    pub fn from_parts(date: AccountingDate, monthly_cap_gib: u32, resume_window: ResumeWindow) -> Self {
        Self {
            date,
            budgets: compute_budgets(&date, monthly_cap_gib),
            resume_window,
        }
    }
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Final controller state.
    pub state: ControllerState,
    /// Active torrent count from the session snapshot.
    pub active_torrents: u64,
    /// Usage booked this cycle; `None` when nothing was active.
    pub delta: Option<u64>,
    /// Month-to-date usage after this cycle.
    pub usage_this_month: u64,
    /// Reannounce step failures; a failed listing counts once.
    pub reannounce_failures: usize,
}

impl CycleReport {
    /// Whether this cycle stopped the torrents.
    pub fn throttled(&self) -> bool {
        self.state == ControllerState::Throttled
    }

    /// Whether this cycle started the torrents.
    pub fn resumed(&self) -> bool {
        self.state == ControllerState::Resuming
    }
}

/// Reasons a cycle ended without a report.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The client could not be reached or rejected a call.
    #[error("transmission unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    /// Torrents are active yet the client reports no cumulative transfer.
    #[error("{active} active torrents but cumulative usage is zero")]
    AnomalousZeroUsage {
        /// Active torrent count from the snapshot.
        active: u64,
    },

    /// The ledger could not be loaded or saved.
    #[error("ledger persistence failed: {0}")]
    Persistence(#[from] LedgerError),
}

impl CycleError {
    /// Whether the process should exit non-zero.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AnomalousZeroUsage { .. })
    }
}

/// Run one accounting cycle.
///
/// Mutates `ledger` in memory only.
///
/// # Errors
///
/// Returns [`CycleError::TransportUnavailable`] on any failed client call
/// outside the reannounce step, and [`CycleError::AnomalousZeroUsage`] when
/// active torrents report zero cumulative bytes.
pub async fn run_cycle<T: Transport + ?Sized>(
    transport: &T,
    ledger: &mut UsageLedger,
    ctx: &CycleContext,
) -> Result<CycleReport, CycleError> {
    let stats = transport.session_stats().await?;
    let active = stats.active_torrent_count;
    debug!(active, "session stats fetched");

    let mut report = CycleReport {
        state: ControllerState::Idle,
        active_torrents: active,
        delta: None,
        usage_this_month: ledger.month_total(ctx.date.year, ctx.date.month),
        reannounce_failures: 0,
    };

    if active > 0 {
        report.state = ControllerState::CheckingUsage;
        report.reannounce_failures = reannounce_downloading(transport).await;

        let current = stats.cumulative.total();
        if current == 0 {
            warn!(active, "usage should not be zero with active torrents");
            return Err(CycleError::AnomalousZeroUsage { active });
        }

        let delta = record_usage(ledger, &ctx.date, current);
        let decision = limits::evaluate(ledger, &ctx.date, &ctx.budgets);
        report.delta = Some(delta);
        report.usage_this_month = decision.usage_this_month;

        if decision.is_over_limit() {
            let stopped = stop_all(transport).await?;
            warn!(severity = "notice", stopped, "transfer cap reached, torrents stopped");
            report.state = ControllerState::Throttled;
        }
    }

    limits::log_usage_summary(report.usage_this_month, &ctx.budgets);

    if ctx.resume_window.contains(&ctx.date) {
        if active == 0 {
            let started = start_all(transport).await?;
            info!(started, "new accounting day, torrents resumed");
            report.state = ControllerState::Resuming;
        } else {
            debug!(active, "resume window open but torrents still active");
        }
    }

    Ok(report)
}

/// Start every torrent and enable autostart, ignoring the ledger.
///
/// # Errors
///
/// Returns the first failed client call.
pub async fn force_start<T: Transport + ?Sized>(transport: &T) -> Result<usize, TransportError> {
    let started = start_all(transport).await?;
    info!(started, "torrents force-started");
    Ok(started)
}

/// Reannounce every downloading torrent; failures are logged and counted.
///
/// A failed listing counts as one failure and skips the reannounce step.
async fn reannounce_downloading<T: Transport + ?Sized>(transport: &T) -> usize {
    let torrents = match transport.list_torrents().await {
        Ok(torrents) => torrents,
        Err(e) => {
            warn!(error = %e, "listing torrents for reannounce failed");
            return 1;
        }
    };

    let mut failures = 0usize;
    for torrent in torrents {
        if !torrent.status.is_downloading() {
            continue;
        }
        if let Err(e) = transport.reannounce_torrent(torrent.id).await {
            warn!(id = torrent.id, error = %e, "reannounce failed");
            failures = failures.saturating_add(1);
        }
    }
    failures
}

/// Disable autostart, then stop every torrent.
async fn stop_all<T: Transport + ?Sized>(transport: &T) -> Result<usize, TransportError> {
    transport.set_start_added_torrents(false).await?;
    let torrents = transport.list_torrents().await?;
    for torrent in &torrents {
        transport.stop_torrent(torrent.id).await?;
    }
    Ok(torrents.len())
}

/// Enable autostart, then start every torrent.
async fn start_all<T: Transport + ?Sized>(transport: &T) -> Result<usize, TransportError> {
    transport.set_start_added_torrents(true).await?;
    let torrents = transport.list_torrents().await?;
    for torrent in &torrents {
        transport.start_torrent(torrent.id).await?;
    }
    Ok(torrents.len())
}
