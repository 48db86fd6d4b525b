//! Tabular alignment: groups sibling partitions into rows, lets a
//! caller-supplied scanner bid on column positions per row, and rewrites
//! token spacing so the bids line up in columns (or deliberately doesn't,
//! depending on policy).

use std::collections::BTreeSet;
use std::ops::Range;

use crate::byte_offset_set::ByteOffsetSet;
use crate::partition_tree::{self, NodeId, TokenPartitionTree};
use crate::token::{BreakDecision, PreFormatToken};
use crate::unwrapped_line::{PartitionPolicy, UnwrappedLine};

/// Per-column rendering hints a cell scanner attaches when it bids on a
/// column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentColumnProperties {
    /// Left-justify (pad on the right) when true; right-justify otherwise.
    pub flush_left: bool,
    /// Overrides the measured left border (normally the cell's first
    /// token's `spaces_required`).
    pub left_border_override: Option<i32>,
    /// A token immediately following the cell's content on some rows (e.g.
    /// a trailing comma) should align instead of receiving its own padding.
    pub contains_delimiter: bool,
}

impl Default for AlignmentColumnProperties {
    fn default() -> Self {
        AlignmentColumnProperties {
            flush_left: true,
            left_border_override: None,
            contains_delimiter: false,
        }
    }
}

/// One column bid: a path into the row's originating subtree (the
/// canonical total order bids are merged by across rows), the token the
/// cell's content starts at, and rendering hints.
#[derive(Debug, Clone)]
pub struct ColumnPositionEntry {
    pub path: Vec<usize>,
    pub starting_token: usize,
    pub properties: AlignmentColumnProperties,
}

/// The column bids a cell scanner records for a single row, built via
/// repeated calls to [`ColumnPositionTree::reserve_new_column`]. The root
/// is an implicit sentinel; top-level entries are its children, and an
/// entry's own children are its subcolumns.
#[derive(Debug, Clone, Default)]
pub struct ColumnPositionTree {
    entries: Vec<ColumnPositionEntry>,
    children: Vec<Vec<u32>>,
    root_children: Vec<u32>,
}

impl ColumnPositionTree {
    pub fn new() -> Self {
        ColumnPositionTree::default()
    }

    /// Records a column bid as a child of `parent` (or of the root, if
    /// `None`), returning a handle subcolumns can use as their own parent.
    pub fn reserve_new_column(
        &mut self,
        parent: Option<u32>,
        path: Vec<usize>,
        starting_token: usize,
        properties: AlignmentColumnProperties,
    ) -> u32 {
        let idx = self.entries.len() as u32;
        self.entries.push(ColumnPositionEntry {
            path,
            starting_token,
            properties,
        });
        self.children.push(Vec::new());
        match parent {
            Some(p) => self.children[p as usize].push(idx),
            None => self.root_children.push(idx),
        }
        idx
    }

    pub fn root_children(&self) -> &[u32] {
        &self.root_children
    }

    pub fn children_of(&self, idx: u32) -> &[u32] {
        &self.children[idx as usize]
    }

    pub fn entry(&self, idx: u32) -> &ColumnPositionEntry {
        &self.entries[idx as usize]
    }
}

/// Whole-group alignment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentPolicy {
    Preserve,
    FlushLeft,
    Align,
    InferUserIntent,
}

/// A caller-selected run of sibling rows that should be aligned together,
/// plus the scanner that bids on column positions for each row.
pub struct AlignablePartitionGroup<'a> {
    pub rows: Vec<NodeId>,
    pub cell_scanner: Box<dyn Fn(&TokenPartitionTree, NodeId) -> ColumnPositionTree + 'a>,
    pub policy: AlignmentPolicy,
    pub ignore: Option<Box<dyn Fn(&TokenPartitionTree, NodeId) -> bool + 'a>>,
}

const MIN_MATCH_COUNT: usize = 2;

/// A resolved cell: the content token, an optional trailing delimiter
/// token, and the left-border override in effect for this row's bid.
#[derive(Debug, Clone, Copy)]
struct Cell {
    content: usize,
    delimiter: Option<usize>,
    left_border_override: Option<i32>,
}

/// Aligns every group `extract_alignment_groups` selects out of `rows`.
pub fn tabular_align_tokens<'a>(
    column_limit: i32,
    full_text: &str,
    disabled: &ByteOffsetSet,
    tree: &mut TokenPartitionTree,
    tokens: &mut Vec<PreFormatToken>,
    rows: &[NodeId],
    extract_alignment_groups: impl Fn(&TokenPartitionTree, &[NodeId]) -> Vec<AlignablePartitionGroup<'a>>,
) {
    let groups = extract_alignment_groups(tree, rows);
    for group in &groups {
        align_group(column_limit, full_text, disabled, tree, tokens, group);
    }
}

fn align_group(
    column_limit: i32,
    full_text: &str,
    disabled: &ByteOffsetSet,
    tree: &mut TokenPartitionTree,
    tokens: &mut Vec<PreFormatToken>,
    group: &AlignablePartitionGroup<'_>,
) {
    let active_rows: Vec<NodeId> = group
        .rows
        .iter()
        .copied()
        .filter(|&r| match &group.ignore {
            Some(pred) => !pred(tree, r),
            None => true,
        })
        .collect();

    if active_rows.len() < MIN_MATCH_COUNT {
        log::debug!("alignment group below MIN_MATCH_COUNT ({} rows), preserving original spacing", active_rows.len());
        format_using_original_spacing(tree, tokens, full_text, &active_rows);
        return;
    }
    if active_rows
        .iter()
        .any(|&r| partition_tree::any_subrange_is_disabled(tree, r, tokens, disabled))
    {
        log::debug!("alignment group overlaps a disabled range, preserving original spacing");
        format_using_original_spacing(tree, tokens, full_text, &active_rows);
        return;
    }
    if group.policy == AlignmentPolicy::Preserve {
        apply_preserve(tree, tokens, &active_rows);
        return;
    }

    let col_trees: Vec<ColumnPositionTree> = active_rows
        .iter()
        .map(|&r| (group.cell_scanner)(tree, r))
        .collect();
    let paths = merge_top_level(&col_trees);
    if paths.is_empty() {
        format_using_original_spacing(tree, tokens, full_text, &active_rows);
        return;
    }

    let (cells, col_props) = resolve_cells(&col_trees, &active_rows);
    let widths = compute_widths(tokens, &cells, &col_props);

    let decision = decide_policy(group.policy, tokens, full_text, &cells, &widths);
    match decision {
        Decision::Align => {
            let lengths = row_lengths_aligned(tokens, &cells, &widths, &col_props);
            if lengths.into_iter().any(|len| len > column_limit as usize) {
                log::debug!("aligned rendering exceeds column_limit, falling back to flush-left");
                apply_flush_left(tree, tokens, &active_rows, &cells);
            } else {
                apply_aligned(tree, tokens, &active_rows, &cells, &widths, &col_props);
            }
        }
        Decision::FlushLeft => apply_flush_left(tree, tokens, &active_rows, &cells),
        Decision::Preserve => apply_preserve(tree, tokens, &active_rows),
    }
}

enum Decision {
    Align,
    FlushLeft,
    Preserve,
}

/// Applies the `infer_user_intent` heuristic, else passes the fixed
/// policies straight through.
///
/// `infer_user_intent` measures how far the original spacing already sits
/// from the tightest (flush-left) rendering and how much wider the aligned
/// rendering would be than that baseline: close-to-flush-left-and-cheap
/// gets aligned for free, close-to-flush-left-but-expensive keeps the
/// user's flush-left-like intent, clearly-wider-than-flush-left gets
/// aligned to normalize it, and the narrow band in between is left alone.
fn decide_policy(
    policy: AlignmentPolicy,
    tokens: &[PreFormatToken],
    full_text: &str,
    cells: &[Vec<Option<Cell>>],
    widths: &[usize],
) -> Decision {
    match policy {
        AlignmentPolicy::Align => Decision::Align,
        AlignmentPolicy::FlushLeft => Decision::FlushLeft,
        AlignmentPolicy::Preserve => Decision::Preserve,
        AlignmentPolicy::InferUserIntent => {
            let natural = row_lengths_natural(tokens, cells);
            let aligned = row_lengths_aligned(
                tokens,
                cells,
                widths,
                &vec![AlignmentColumnProperties::default(); widths.len()],
            );
            let max_align_deviation = natural
                .iter()
                .zip(aligned.iter())
                .map(|(&n, &a)| a.saturating_sub(n))
                .max()
                .unwrap_or(0);
            let max_original_excess = max_original_excess_over_flush_left(tokens, full_text, cells);

            if max_original_excess <= 2 {
                if max_align_deviation > 2 {
                    Decision::FlushLeft
                } else {
                    Decision::Align
                }
            } else if max_original_excess >= 4 {
                Decision::Align
            } else {
                Decision::Preserve
            }
        }
    }
}

/// Distinct column paths at the top level, in path order, across every
/// row's scanned column tree.
fn merge_top_level(col_trees: &[ColumnPositionTree]) -> Vec<Vec<usize>> {
    let mut paths: BTreeSet<Vec<usize>> = BTreeSet::new();
    for t in col_trees {
        for &idx in t.root_children() {
            paths.insert(t.entry(idx).path.clone());
        }
    }
    paths.into_iter().collect()
}

/// Resolves every merged column, top level first, recursing into a
/// column's subcolumns (its entries' own children across rows) wherever
/// any row bid one. A column with subcolumns contributes no cell of its
/// own to the flattened result — its span is entirely accounted for by
/// its (recursively resolved) subcolumns, which are spliced into the
/// flattened sequence in its place, so the existing left-to-right
/// positional machinery (widths/simulate_aligned_row/…) needs no change
/// to align within a parent cell as well as across top-level columns.
fn resolve_cells(
    col_trees: &[ColumnPositionTree],
    rows: &[NodeId],
) -> (Vec<Vec<Option<Cell>>>, Vec<AlignmentColumnProperties>) {
    let root_idxs: Vec<Vec<u32>> = col_trees.iter().map(|t| t.root_children().to_vec()).collect();
    resolve_level(col_trees, rows, &root_idxs)
}

/// Resolves one level of the column tree: `level_idxs[r]` lists the entry
/// indices row `r` bid at this level (root children, or the children of
/// whichever parent entry matched the enclosing column).
fn resolve_level(
    col_trees: &[ColumnPositionTree],
    rows: &[NodeId],
    level_idxs: &[Vec<u32>],
) -> (Vec<Vec<Option<Cell>>>, Vec<AlignmentColumnProperties>) {
    let mut paths: BTreeSet<Vec<usize>> = BTreeSet::new();
    for (r, idxs) in level_idxs.iter().enumerate() {
        for &idx in idxs {
            paths.insert(col_trees[r].entry(idx).path.clone());
        }
    }

    let mut cells = Vec::new();
    let mut col_props = Vec::new();
    for path in &paths {
        let matched: Vec<Option<u32>> = level_idxs
            .iter()
            .enumerate()
            .map(|(r, idxs)| idxs.iter().copied().find(|&idx| &col_trees[r].entry(idx).path == path))
            .collect();

        let has_subcolumns = matched
            .iter()
            .enumerate()
            .any(|(r, mi)| mi.map(|idx| !col_trees[r].children_of(idx).is_empty()).unwrap_or(false));

        if has_subcolumns {
            let child_idxs: Vec<Vec<u32>> = matched
                .iter()
                .enumerate()
                .map(|(r, mi)| mi.map(|idx| col_trees[r].children_of(idx).to_vec()).unwrap_or_default())
                .collect();
            let (sub_cells, sub_props) = resolve_level(col_trees, rows, &child_idxs);
            cells.extend(sub_cells);
            col_props.extend(sub_props);
            continue;
        }

        let mut props = None;
        let mut row_cells = Vec::with_capacity(rows.len());
        for (r, mi) in matched.iter().enumerate() {
            let cell = mi.map(|idx| {
                let entry = col_trees[r].entry(idx);
                if props.is_none() {
                    props = Some(entry.properties);
                }
                let content = entry.starting_token;
                let delimiter = if entry.properties.contains_delimiter {
                    next_token_if_not_own_row_end(col_trees, r, content)
                } else {
                    None
                };
                Cell {
                    content,
                    delimiter,
                    left_border_override: entry.properties.left_border_override,
                }
            });
            row_cells.push(cell);
        }
        cells.push(row_cells);
        col_props.push(props.unwrap_or_default());
    }
    (cells, col_props)
}

fn next_token_if_not_own_row_end(col_trees: &[ColumnPositionTree], row: usize, content: usize) -> Option<usize> {
    let _ = (col_trees, row);
    Some(content + 1)
}

fn left_border(tokens: &[PreFormatToken], cell: &Cell) -> i32 {
    cell.left_border_override
        .unwrap_or(tokens[cell.content].before.spaces_required as i32)
}

fn cell_len(tokens: &[PreFormatToken], cell: &Cell) -> usize {
    let mut len = tokens[cell.content].length();
    if let Some(d) = cell.delimiter {
        if d < tokens.len() {
            len += tokens[d].length();
        }
    }
    len
}

fn compute_widths(
    tokens: &[PreFormatToken],
    cells: &[Vec<Option<Cell>>],
    _col_props: &[AlignmentColumnProperties],
) -> Vec<usize> {
    cells
        .iter()
        .map(|col| {
            col.iter()
                .filter_map(|c| c.as_ref())
                .map(|cell| left_border(tokens, cell).max(0) as usize + cell_len(tokens, cell))
                .max()
                .unwrap_or(0)
        })
        .collect()
}

/// Per row, simulates placing every present cell at its shared column
/// position, returning the final cursor (= rendered length) and, for each
/// present cell, the number of leading spaces to emit before its content.
fn simulate_aligned_row(
    tokens: &[PreFormatToken],
    cells: &[Vec<Option<Cell>>],
    widths: &[usize],
    col_props: &[AlignmentColumnProperties],
    row: usize,
) -> (usize, Vec<(usize, i32, Option<usize>)>) {
    let last_present = (0..widths.len()).rev().find(|&j| cells[j][row].is_some());
    let mut cursor = 0usize;
    let mut prefix = 0usize;
    let mut emissions = Vec::new();
    for (j, w) in widths.iter().enumerate() {
        if let Some(cell) = cells[j][row] {
            let target_start = prefix;
            let catchup = target_start.saturating_sub(cursor);
            let clen = cell_len(tokens, &cell);
            let is_last = Some(j) == last_present;
            let _ = is_last;
            if col_props[j].flush_left {
                emissions.push((cell.content, catchup as i32, cell.delimiter));
                cursor = target_start + clen;
            } else {
                let pad_left = catchup + w.saturating_sub(clen);
                emissions.push((cell.content, pad_left as i32, cell.delimiter));
                cursor = target_start + w;
            }
        }
        prefix += w;
    }
    (cursor, emissions)
}

fn row_lengths_aligned(
    tokens: &[PreFormatToken],
    cells: &[Vec<Option<Cell>>],
    widths: &[usize],
    col_props: &[AlignmentColumnProperties],
) -> Vec<usize> {
    let num_rows = cells.first().map(|c| c.len()).unwrap_or(0);
    (0..num_rows)
        .map(|r| simulate_aligned_row(tokens, cells, widths, col_props, r).0)
        .collect()
}

/// Each row's own minimal (unaligned) rendered length: every present cell
/// follows the previous with just its natural left border, no padding to
/// match other rows and no reserved space for columns this row lacks.
fn row_lengths_natural(tokens: &[PreFormatToken], cells: &[Vec<Option<Cell>>]) -> Vec<usize> {
    let num_rows = cells.first().map(|c| c.len()).unwrap_or(0);
    (0..num_rows)
        .map(|r| {
            let mut total = 0usize;
            let mut first = true;
            for col in cells {
                if let Some(cell) = col[r] {
                    total += cell_len(tokens, &cell);
                    if !first {
                        total += left_border(tokens, &cell).max(0) as usize;
                    }
                    first = false;
                }
            }
            total
        })
        .collect()
}

/// Maximum, over every present non-first cell in every row, of how many
/// spaces beyond `spaces_required` the original source actually had.
fn max_original_excess_over_flush_left(
    tokens: &[PreFormatToken],
    full_text: &str,
    cells: &[Vec<Option<Cell>>],
) -> i32 {
    let num_rows = cells.first().map(|c| c.len()).unwrap_or(0);
    let mut max_excess = 0i32;
    for r in 0..num_rows {
        let mut first = true;
        for col in cells {
            if let Some(cell) = col[r] {
                if first {
                    first = false;
                    continue;
                }
                if cell.content == 0 {
                    continue;
                }
                let gap = gap_text(tokens, full_text, cell.content);
                if gap.contains('\n') {
                    continue;
                }
                let gap_spaces = gap.chars().count() as i32;
                let natural = tokens[cell.content].before.spaces_required as i32;
                max_excess = max_excess.max(gap_spaces - natural);
            }
        }
    }
    max_excess.max(0)
}

fn apply_preserve(tree: &TokenPartitionTree, tokens: &mut [PreFormatToken], rows: &[NodeId]) {
    partition_tree::indent_but_preserve_other_spacing(tree, tokens, rows);
}

fn apply_aligned(
    tree: &mut TokenPartitionTree,
    tokens: &mut Vec<PreFormatToken>,
    rows: &[NodeId],
    cells: &[Vec<Option<Cell>>],
    widths: &[usize],
    col_props: &[AlignmentColumnProperties],
) {
    for (r, &row) in rows.iter().enumerate() {
        let (_, emissions) = simulate_aligned_row(tokens, cells, widths, col_props, r);
        encode_row(tree, tokens, row, &emissions);
    }
}

/// Flush-left rendering: each row uses only its own cells' natural
/// minimum spacing, with no padding to match other rows and no reserved
/// space for columns this row lacks.
fn apply_flush_left(
    tree: &mut TokenPartitionTree,
    tokens: &mut Vec<PreFormatToken>,
    rows: &[NodeId],
    cells: &[Vec<Option<Cell>>],
) {
    for (r, &row) in rows.iter().enumerate() {
        let mut emissions = Vec::new();
        let mut first = true;
        for col in cells {
            if let Some(cell) = col[r] {
                let spaces = if first { 0 } else { left_border(tokens, &cell) };
                first = false;
                emissions.push((cell.content, spaces, cell.delimiter));
            }
        }
        encode_row(tree, tokens, row, &emissions);
    }
}

/// Converts `row` into an `already_formatted` partition with one `inline`
/// child per emitted cell (content token, then its delimiter if any), then
/// immediately commits those decisions onto the underlying tokens.
fn encode_row(
    tree: &mut TokenPartitionTree,
    tokens: &mut Vec<PreFormatToken>,
    row: NodeId,
    emissions: &[(usize, i32, Option<usize>)],
) {
    let range = tree.value(row).tokens_range();
    if range.is_empty() || emissions.is_empty() {
        return;
    }
    let indentation = tree.value(row).indentation_spaces + emissions[0].1;
    tree.clear_children(row);
    *tree.value_mut(row) =
        UnwrappedLine::with_policy(indentation, range.start, PartitionPolicy::AlreadyFormatted);
    tree.value_mut(row).span_up_to(range.end);

    for &(content, spaces, delimiter) in emissions {
        let end = delimiter.map(|d| d + 1).unwrap_or(content + 1).min(range.end);
        let mut child =
            UnwrappedLine::with_policy(spaces, content, PartitionPolicy::Inline);
        child.span_up_to(end);
        tree.add_child(row, child);
    }
    let _ = partition_tree::apply_already_formatted_partition_to_tokens(tree, tokens, row);
}

/// Converts `rows` into `already_formatted` partitions whose spacing
/// matches the original source byte-for-byte, splitting at embedded
/// newlines into sibling lines under an `always_expand` node.
pub fn format_using_original_spacing(
    tree: &mut TokenPartitionTree,
    tokens: &mut [PreFormatToken],
    full_text: &str,
    rows: &[NodeId],
) {
    for &row in rows {
        let range = tree.value(row).tokens_range();
        if range.is_empty() {
            continue;
        }
        let indentation = tree.value(row).indentation_spaces;
        let line_groups = split_at_newlines(tokens, full_text, range.clone());
        if line_groups.len() == 1 {
            apply_single_line_spacing(tokens, full_text, &line_groups[0], indentation);
            tree.value_mut(row).partition_policy = PartitionPolicy::AlreadyFormatted;
        } else {
            *tree.value_mut(row) =
                UnwrappedLine::with_policy(indentation, range.start, PartitionPolicy::AlwaysExpand);
            tree.value_mut(row).span_up_to(range.end);
            for seg in &line_groups {
                let seg_indent = if seg.start == range.start {
                    indentation
                } else {
                    trailing_spaces(tokens, full_text, seg.start)
                };
                let mut line_value =
                    UnwrappedLine::with_policy(seg_indent, seg.start, PartitionPolicy::AlreadyFormatted);
                line_value.span_up_to(seg.end);
                tree.add_child(row, line_value);
                apply_single_line_spacing(tokens, full_text, seg, seg_indent);
            }
        }
    }
}

fn split_at_newlines(tokens: &[PreFormatToken], full_text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = range.start;
    for i in (range.start + 1)..range.end {
        if gap_text(tokens, full_text, i).contains('\n') {
            groups.push(start..i);
            start = i;
        }
    }
    groups.push(start..range.end);
    groups
}

fn gap_text<'a>(tokens: &[PreFormatToken], full_text: &'a str, i: usize) -> &'a str {
    let prev = &tokens[i - 1];
    let cur = &tokens[i];
    let gap_start = (prev.source_offset + prev.text.len()).min(full_text.len());
    let gap_end = cur.source_offset.min(full_text.len());
    if gap_end >= gap_start {
        &full_text[gap_start..gap_end]
    } else {
        ""
    }
}

fn trailing_spaces(tokens: &[PreFormatToken], full_text: &str, i: usize) -> i32 {
    let gap = gap_text(tokens, full_text, i);
    gap.rsplit('\n')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| *c == ' ' || *c == '\t')
        .count() as i32
}

fn apply_single_line_spacing(
    tokens: &mut [PreFormatToken],
    full_text: &str,
    range: &Range<usize>,
    indentation: i32,
) {
    if range.is_empty() {
        return;
    }
    tokens[range.start].before.break_decision = BreakDecision::MustWrap;
    tokens[range.start].before.spaces_required = indentation.max(0) as u32;
    for i in (range.start + 1)..range.end {
        let gap = gap_text(tokens, full_text, i);
        tokens[i].before.break_decision = BreakDecision::AppendAligned;
        tokens[i].before.spaces_required = gap.chars().count() as u32;
    }
}
