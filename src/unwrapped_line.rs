//! `UnwrappedLine`: a contiguous range of pre-format tokens that forms one
//! formatter decision unit, plus the partition-policy enum that drives both
//! the tabular aligner and the layout optimizer.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Per-node policy controlling how a `TokenPartitionTree` node's
/// subpartitions are combined into final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionPolicy {
    /// No policy has been set yet.
    Uninitialized,
    /// Exists purely for grouping; always expand into subpartitions.
    AlwaysExpand,
    /// Collapse to one line if it fits, else expand.
    FitOnLineElseExpand,
    /// Subpartitions behave like auto-sized, space-padded table columns.
    TabularAlignment,
    /// Spacing is fixed; may contain `Inline` children. The optimizer and
    /// renderer must reproduce it verbatim.
    AlreadyFormatted,
    /// A leaf slice of an `AlreadyFormatted` parent, carrying its own
    /// spacing-before. Must be a leaf; all siblings must also be `Inline`.
    Inline,
    /// Append subpartitions to a line as long as they fit, wrapping
    /// aligned to the first subpartition's position otherwise.
    AppendFittingSubPartitions,
    /// Handled by the layout optimizer: place children on the same line.
    Juxtaposition,
    /// Handled by the layout optimizer: place each child on its own line.
    Stack,
    /// Handled by the layout optimizer: juxtapose-or-stack with hanging
    /// indent, picking the cheaper.
    Wrap,
    /// Handled by the layout optimizer: juxtapose unless any child after
    /// the first must wrap, else stack with indentation.
    JuxtapositionOrIndentedStack,
}

impl std::fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PartitionPolicy::Uninitialized => "uninitialized",
            PartitionPolicy::AlwaysExpand => "always-expand",
            PartitionPolicy::FitOnLineElseExpand => "fit-else-expand",
            PartitionPolicy::TabularAlignment => "tabular-alignment",
            PartitionPolicy::AlreadyFormatted => "already-formatted",
            PartitionPolicy::Inline => "inline",
            PartitionPolicy::AppendFittingSubPartitions => "append-fitting-sub-partitions",
            PartitionPolicy::Juxtaposition => "juxtaposition",
            PartitionPolicy::Stack => "stack",
            PartitionPolicy::Wrap => "wrap",
            PartitionPolicy::JuxtapositionOrIndentedStack => "juxtaposition-or-indented-stack",
        };
        f.write_str(s)
    }
}

/// Opaque handle to whatever syntax-tree node a line originated from.
/// The core never dereferences this; it is caller-defined and passed
/// through so alignment cell scanners (implemented by the caller, outside
/// this crate) can look up their own syntax tree.
pub type OriginId = u64;

/// A contiguous range of pre-format tokens representing one formatter
/// decision unit, with an indentation level and a partition policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwrappedLine {
    tokens: Range<usize>,
    pub indentation_spaces: i32,
    pub partition_policy: PartitionPolicy,
    pub origin: Option<OriginId>,
}

impl UnwrappedLine {
    pub fn new(indentation_spaces: i32, begin: usize) -> Self {
        UnwrappedLine {
            tokens: begin..begin,
            indentation_spaces,
            partition_policy: PartitionPolicy::Uninitialized,
            origin: None,
        }
    }

    pub fn with_policy(indentation_spaces: i32, begin: usize, policy: PartitionPolicy) -> Self {
        let mut line = Self::new(indentation_spaces, begin);
        line.partition_policy = policy;
        line
    }

    pub fn tokens_range(&self) -> Range<usize> {
        self.tokens.clone()
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Extends the range's upper bound forward by one token.
    pub fn span_next_token(&mut self) {
        self.tokens.end += 1;
    }

    /// Extends the range's lower bound backward by one token.
    pub fn span_prev_token(&mut self) {
        debug_assert!(self.tokens.start > 0);
        self.tokens.start -= 1;
    }

    /// Extends the lower bound to `begin` (inclusive).
    pub fn span_back_to(&mut self, begin: usize) {
        self.tokens.start = begin;
    }

    /// Extends the upper bound to `end` (exclusive).
    pub fn span_up_to(&mut self, end: usize) {
        self.tokens.end = end;
    }
}
