//! Progress reporting
//!
//! An optional status collaborator is polled at the same cadence as the
//! cancellation token. Returning `false` from a progress call is a *soft*
//! stop: the operation exits early and the caller discards the partial
//! result. It is a user-initiated abort signal, softer than cancellation,
//! and never treated as an error.

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Routine progress information.
    Info,
    /// A tolerated anomaly worth surfacing.
    Warning,
    /// A failure the operation is about to report.
    Error,
}

/// Receiver for decode/merge progress.
///
/// All methods have defaults so implementors override only what they show.
/// The `bool` returns mean "continue?" — `false` requests a soft stop.
pub trait StatusLogger {
    /// A long-running operation with the given label is starting.
    fn start_logging(&mut self, _label: &str) {}

    /// Report completion percentage. Returns whether to continue.
    fn set_progress(&mut self, _percent: u32) -> bool {
        true
    }

    /// Report a status message. Returns whether to continue.
    fn set_text(&mut self, _message: &str, _level: LogLevel) -> bool {
        true
    }

    /// The operation has finished (successfully or not).
    fn end_logging(&mut self) {}
}

/// A status logger that ignores everything and never stops the operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusLogger;

impl StatusLogger for NullStatusLogger {}
