//! Pre-format tokens: one entry per significant source token, enriched with
//! the spacing decision that should be applied before it.

use serde::{Deserialize, Serialize};

/// How much space (if any) to place before a token, and whether that
/// decision is still open for the optimizer/aligner to choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakDecision {
    /// Not yet decided; a later stage (alignment, optimizer) will set this.
    Undecided,
    /// Must be appended on the same line as the previous token.
    MustAppend,
    /// Must start a new line.
    MustWrap,
    /// Appended on the same line, with spacing computed by the aligner.
    AppendAligned,
    /// Reproduce the original source spacing verbatim.
    Preserve,
}

/// The spacing record attached to a token: how many spaces (if any) precede
/// it, whether that's fixed or still open, and the cost of breaking before
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spacing {
    pub spaces_required: u32,
    pub break_decision: BreakDecision,
    pub break_penalty: u32,
    /// Byte offset into the original source text marking where this
    /// token's "preserved" original spacing begins, used when
    /// `break_decision == Preserve`.
    pub preserved_space_start: usize,
}

impl Spacing {
    pub fn new(spaces_required: u32) -> Self {
        Spacing {
            spaces_required,
            break_decision: BreakDecision::Undecided,
            break_penalty: 0,
            preserved_space_start: 0,
        }
    }
}

/// One significant source token, enriched with a spacing decision.
///
/// `PreFormatToken`s are owned by a flat `Vec` for the duration of one
/// file's format pass; every range used downstream is a half-open index
/// range `[begin, end)` into that vector, never a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreFormatToken {
    pub text: String,
    /// Byte offset of this token's first character in the original source,
    /// used for disabled-range checks and for reconstructing original
    /// spacing.
    pub source_offset: usize,
    pub before: Spacing,
}

impl PreFormatToken {
    pub fn new(text: impl Into<String>, source_offset: usize) -> Self {
        PreFormatToken {
            text: text.into(),
            source_offset,
            before: Spacing::new(0),
        }
    }

    /// Textual length (columns) of this token.
    pub fn length(&self) -> usize {
        self.text.chars().count()
    }
}
