//! Style parameters read by the tabular aligner and layout optimizer.

use serde::{Deserialize, Serialize};

/// Read-only style knobs for a single formatting pass.
///
/// Defaults mirror verible's published defaults for its SystemVerilog
/// formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicFormatStyle {
    /// Number of spaces per indentation level.
    pub indentation_spaces: i32,
    /// Continuation indent used when wrapping a line.
    pub wrap_spaces: i32,
    /// Maximum desired line width.
    pub column_limit: i32,
    /// Cost per column of overflow past `column_limit`.
    pub over_column_limit_penalty: i32,
    /// Cost charged per extra line produced by a `stack`.
    pub line_break_penalty: i32,
}

impl Default for BasicFormatStyle {
    fn default() -> Self {
        BasicFormatStyle {
            indentation_spaces: 2,
            wrap_spaces: 4,
            column_limit: 100,
            over_column_limit_penalty: 100,
            line_break_penalty: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_round_trips_through_json_config() {
        let style = BasicFormatStyle {
            column_limit: 80,
            ..Default::default()
        };
        let json = serde_json::to_string(&style).expect("style should serialize");
        let parsed: BasicFormatStyle = serde_json::from_str(&json).expect("style should parse back");
        assert_eq!(parsed, style);
    }
}
