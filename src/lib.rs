//! Core of a SystemVerilog formatter: a token-partition tree, a tabular
//! alignment engine, and a Yelland-style layout optimizer.
//!
//! This crate takes a hierarchical partition of formatted tokens (built
//! elsewhere, by a tree unwrapper over a concrete syntax tree) and produces
//! a rendering that respects per-token spacing constraints and a column
//! limit, minimizes a weighted sum of line breaks and overflow, and
//! optionally aligns related tokens into columns. Lexing, parsing, lint
//! rules, and rendering to a terminal or patch file are out of scope; see
//! `SPEC_FULL.md`.

pub mod align;
pub mod byte_offset_set;
pub mod error;
pub mod layout;
pub mod partition_tree;
pub mod reshape;
pub mod style;
pub mod token;
pub mod unwrapped_line;

pub use byte_offset_set::ByteOffsetSet;
pub use error::{FormatError, FormatResult};
pub use style::BasicFormatStyle;
pub use token::{BreakDecision, PreFormatToken, Spacing};
pub use unwrapped_line::{OriginId, PartitionPolicy, UnwrappedLine};

/// Trivial reference renderer: concatenates every token's text, prefixed
/// by a newline (and its own indentation) at `MustWrap` boundaries or by
/// `spaces_required` spaces otherwise. This is the contract the rest of
/// the crate formats tokens to satisfy, not a goal in itself — real
/// embedders render by walking their own source text/patch representation.
pub fn render_to_string(tokens: &[PreFormatToken]) -> String {
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 {
            if tok.before.break_decision == BreakDecision::MustWrap {
                out.push('\n');
            }
            for _ in 0..tok.before.spaces_required {
                out.push(' ');
            }
        }
        out.push_str(&tok.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_to_string_applies_spacing_and_must_wrap() {
        let mut tokens = vec![
            PreFormatToken::new("module", 0),
            PreFormatToken::new("foo", 7),
            PreFormatToken::new("endmodule", 11),
        ];
        tokens[1].before.spaces_required = 1;
        tokens[2].before.spaces_required = 0;
        tokens[2].before.break_decision = BreakDecision::MustWrap;

        assert_eq!(render_to_string(&tokens), "module foo\nendmodule");
    }
}
