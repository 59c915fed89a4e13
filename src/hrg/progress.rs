//! Diagnostic progress records emitted by the fitting loop
//!
//! Records are advisory: sinks may drop them and nothing in the fit depends
//! on what a sink does.

use log::info;
use std::fmt;

/// Stage of the fitting loop a record comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPhase {
    /// Fixed-length burn-in
    BurnIn,
    /// Burst-based search for equilibrium
    Equilibrium,
    /// Snapshot sampling for the averaged matrix
    Sampling,
}

impl fmt::Display for FitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BurnIn => "burn-in",
            Self::Equilibrium => "equilibrium",
            Self::Sampling => "sampling",
        };
        f.write_str(name)
    }
}

/// `(step, L, best L, accepted, deltaL)` at one point of the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    /// Phase the step belongs to
    pub phase: FitPhase,
    /// Global step counter (1-based)
    pub step: u64,
    /// Current log-likelihood
    pub log_likelihood: f64,
    /// Best log-likelihood so far
    pub best_log_likelihood: f64,
    /// Whether this step's move was accepted
    pub accepted: bool,
    /// `deltaL` of this step's proposal
    pub delta_l: f64,
}

impl fmt::Display for ProgressRecord {
    /// Tab-separated `[step]  L  best L  taken  deltaL`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]\t{:.3}\t{:.3}\t{}\t{:.3}",
            self.step,
            self.log_likelihood,
            self.best_log_likelihood,
            if self.accepted { "*" } else { "" },
            self.delta_l
        )
    }
}

/// Receiver of progress records
pub trait ProgressSink {
    /// Handle one record
    fn record(&mut self, record: &ProgressRecord);
}

/// Renders records through the `log` facade at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn record(&mut self, record: &ProgressRecord) {
        info!("{}\t{}", record.phase, record);
    }
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn record(&mut self, _record: &ProgressRecord) {}
}

impl ProgressSink for Vec<ProgressRecord> {
    fn record(&mut self, record: &ProgressRecord) {
        self.push(*record);
    }
}
