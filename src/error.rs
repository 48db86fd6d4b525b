//! Error kinds for the formatting core.
//!
//! Only [`FormatError::InvariantViolation`] is meant to ever reach a public
//! API as `Err`. The other variants describe conditions that are handled
//! locally by the producing subsystem (tabular alignment, the layout
//! optimizer) and recovered from in place; they exist as a typed vocabulary
//! for logging, not as values callers are expected to match on.

use thiserror::Error;

/// Errors surfaced by the token-partition tree, tabular alignment engine,
/// and layout optimizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A structural invariant of a token-partition tree or layout tree was
    /// broken (non-contiguous siblings, parent range != children union, an
    /// `Inline` node with non-`Inline` siblings or with children, etc).
    /// Fatal: the caller should abort formatting of the file.
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// The layout optimizer encountered a partition policy it does not
    /// handle. Recovered from internally by falling back to `Stack`.
    #[error("unsupported partition policy: {policy}")]
    UnsupportedPartitionPolicy { policy: String },

    /// The tabular aligner could not produce a layout within the column
    /// limit. Recovered from internally by falling back to flush-left, then
    /// to original spacing.
    #[error("alignment exceeded column limit: {reason}")]
    AlignmentAbort { reason: String },

    /// A `wrapped_line` request exceeded the token-count heuristic.
    /// Recovered from internally by falling back to a plain `line`.
    #[error("wrap limit exceeded: {token_count} tokens")]
    WrapLimitExceeded { token_count: usize },
}

impl FormatError {
    pub fn invariant(message: impl Into<String>) -> Self {
        FormatError::InvariantViolation {
            message: message.into(),
        }
    }
}

pub type FormatResult<T> = Result<T, FormatError>;
