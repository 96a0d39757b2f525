//! The error taxonomy for the analysis core (spec §7).
//!
//! `BadContinuum` is deliberately absent: it is recovered locally inside
//! the preprocessor and surfaced only as a [`crate::trace::Trace`] warning,
//! never as a propagated error.

use crate::trace::Trace;

/// Errors that can escape the analysis core to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input file could not be parsed as a spectrum.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Fewer than 16 valid samples remained after trimming non-finite values.
    #[error("empty spectrum: {0}")]
    EmptySpectrum(String),

    /// The library filters (type/template/age/exclude) left no candidates.
    #[error("no eligible templates: {0}")]
    NoEligibleTemplates(String),

    /// The caller's cancellation token tripped before scoring finished.
    ///
    /// `trace` carries whatever diagnostics already ran before the
    /// cancellation was observed, including one event per template scored
    /// so far (spec §8 S6 "partial matches recorded in the trace").
    #[error("analysis cancelled after {completed} of {total} templates scored")]
    Cancelled { completed: usize, total: usize, trace: Trace },

    /// A bug, or a precondition the core itself should have guaranteed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Propagated filesystem failure while loading a spectrum or library.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
