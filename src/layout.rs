//! The layout optimizer: Yelland's piecewise-linear cost-function approach
//! to picking a concrete rendering (juxtaposed, stacked, or wrapped) for a
//! token-partition subtree.
//!
//! A [`LayoutFunction`] represents the cost of rendering a subtree as a
//! function of the column it starts at. The primitive constructors build
//! one for a single line; the combinators (`juxtaposition`, `stack`,
//! `choice`, `wrap`, `indent`) build bigger ones out of smaller ones. The
//! dispatcher walks a `TokenPartitionTree` bottom-up, combining according
//! to each node's partition policy, then reconstructs the winning layout
//! back into a `TokenPartitionTree`.

use std::ops::Range;

use crate::error::{FormatError, FormatResult};
use crate::partition_tree::{self, NodeId, TokenPartitionTree};
use crate::style::BasicFormatStyle;
use crate::token::{BreakDecision, PreFormatToken};
use crate::unwrapped_line::{PartitionPolicy, UnwrappedLine};

const INFINITY: i32 = i32::MAX / 2;
const WRAP_TOKENS_LIMIT: usize = 25;
const MUST_WRAP_VIOLATION_PENALTY: f64 = 2_000_000.0;

/// The tag of a [`LayoutItem`]: a leaf line, or a composite combining
/// sublayouts horizontally or vertically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutKind {
    Line { tokens: Range<usize>, length: usize },
    Juxtaposition,
    Stack,
}

/// A single node of a layout tree.
#[derive(Debug, Clone)]
pub struct LayoutItem {
    pub kind: LayoutKind,
    /// Left padding added when this item starts a new line.
    pub indentation_spaces: i32,
    /// Padding added when this item is appended to the right of another.
    pub spaces_before: i32,
    pub must_wrap: bool,
}

impl LayoutItem {
    pub fn length(&self) -> usize {
        match &self.kind {
            LayoutKind::Line { length, .. } => *length,
            _ => 0,
        }
    }
}

/// A tree of [`LayoutItem`]s. Transient: built fresh per subtree by the
/// optimizer and consumed once by the tree reconstructor.
#[derive(Debug, Clone)]
pub struct LayoutTree {
    pub item: LayoutItem,
    pub children: Vec<LayoutTree>,
}

impl LayoutTree {
    pub fn leaf(item: LayoutItem) -> Self {
        LayoutTree {
            item,
            children: Vec::new(),
        }
    }
}

fn same_kind(a: &LayoutKind, b: &LayoutKind) -> bool {
    matches!(
        (a, b),
        (LayoutKind::Juxtaposition, LayoutKind::Juxtaposition) | (LayoutKind::Stack, LayoutKind::Stack)
    )
}

/// Adopts `source`'s children directly into `destination` when both are
/// the same composite kind and `source` carries no extra indentation of
/// its own; otherwise adopts `source` whole, as a single child.
fn adopt_flatten(source: &LayoutTree, destination: &mut LayoutTree) {
    if !source.children.is_empty() && same_kind(&source.item.kind, &destination.item.kind) && source.item.indentation_spaces == 0 {
        destination.children.extend(source.children.iter().cloned());
    } else {
        destination.children.push(source.clone());
    }
}

/// A piece of a [`LayoutFunction`]: for starting columns in
/// `[column, next segment's column)`, the cost is `intercept + gradient *
/// (x - column)`.
#[derive(Debug, Clone)]
pub struct LayoutFunctionSegment {
    pub column: i32,
    pub layout: LayoutTree,
    pub span: i32,
    pub intercept: f64,
    pub gradient: i32,
}

impl LayoutFunctionSegment {
    pub fn cost_at(&self, x: i32) -> f64 {
        self.intercept + self.gradient as f64 * (x - self.column) as f64
    }
}

/// A piecewise-linear, convex cost function of the starting column,
/// represented as segments sorted strictly by `column`.
#[derive(Debug, Clone)]
pub struct LayoutFunction(Vec<LayoutFunctionSegment>);

impl LayoutFunction {
    pub fn segments(&self) -> &[LayoutFunctionSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn must_wrap(&self) -> bool {
        self.0.first().map(|s| s.layout.item.must_wrap).unwrap_or(false)
    }

    fn set_must_wrap(&mut self, value: bool) {
        for seg in &mut self.0 {
            seg.layout.item.must_wrap = value;
        }
    }

    /// Index of the rightmost segment whose `column` is `<= column`.
    pub fn at_or_to_the_left_of(&self, column: i32) -> usize {
        match self.0.binary_search_by(|s| s.column.cmp(&column)) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }
}

fn text_width(tokens: &[PreFormatToken], range: Range<usize>) -> usize {
    if range.is_empty() {
        return 0;
    }
    let mut w = tokens[range.start].length();
    for i in (range.start + 1)..range.end {
        w += tokens[i].before.spaces_required as usize + tokens[i].length();
    }
    w
}

/// Builds the cost function for a single, unbreakable line of text.
pub fn line(
    style: &BasicFormatStyle,
    tokens: &[PreFormatToken],
    range: Range<usize>,
    indentation_spaces: i32,
    spaces_before: i32,
    must_wrap: bool,
) -> LayoutFunction {
    let length = text_width(tokens, range.clone());
    let item = LayoutItem {
        kind: LayoutKind::Line { tokens: range, length },
        indentation_spaces,
        spaces_before,
        must_wrap,
    };
    let span = length as i32;
    let layout = LayoutTree::leaf(item);

    if span < style.column_limit {
        LayoutFunction(vec![
            LayoutFunctionSegment {
                column: 0,
                layout: layout.clone(),
                span,
                intercept: 0.0,
                gradient: 0,
            },
            LayoutFunctionSegment {
                column: style.column_limit - span,
                layout,
                span,
                intercept: 0.0,
                gradient: style.over_column_limit_penalty,
            },
        ])
    } else {
        let intercept = ((span - style.column_limit) * style.over_column_limit_penalty) as f64;
        LayoutFunction(vec![LayoutFunctionSegment {
            column: 0,
            layout,
            span,
            intercept,
            gradient: style.over_column_limit_penalty,
        }])
    }
}

/// One `line()` per token, wrapped at `style.wrap_spaces` continuation
/// indent. Used for `wrap`-policy leaves short enough to be worth the
/// quadratic blow-up of considering every break point.
pub fn wrapped_line(style: &BasicFormatStyle, tokens: &[PreFormatToken], uwline: &UnwrappedLine) -> LayoutFunction {
    let range = uwline.tokens_range();
    let token_lfs: Vec<LayoutFunction> = range
        .clone()
        .map(|i| {
            let must_wrap = tokens[i].before.break_decision == BreakDecision::MustWrap;
            let spaces_before = tokens[i].before.spaces_required as i32;
            line(style, tokens, i..(i + 1), 0, spaces_before, must_wrap)
        })
        .collect();
    wrap(style, &token_lfs, 0, style.wrap_spaces)
}

fn layout_for_leaf(style: &BasicFormatStyle, tokens: &[PreFormatToken], uwline: &UnwrappedLine) -> LayoutFunction {
    let range = uwline.tokens_range();
    let must_wrap = !range.is_empty() && tokens[range.start].before.break_decision == BreakDecision::MustWrap;
    let spaces_before = if range.is_empty() {
        0
    } else {
        tokens[range.start].before.spaces_required as i32
    };
    line(style, tokens, range, uwline.indentation_spaces, spaces_before, must_wrap)
}

/// Shifts every segment of `lf` right by `amount` columns.
pub fn indent(style: &BasicFormatStyle, lf: &LayoutFunction, amount: i32) -> LayoutFunction {
    assert!(!lf.0.is_empty());
    assert!(amount >= 0);

    let mut result = Vec::with_capacity(lf.0.len());
    let mut indent_column = 0;
    let mut idx = lf.at_or_to_the_left_of(amount);
    let mut column = amount;
    loop {
        let segment = &lf.0[idx];
        let columns_over_limit = column - style.column_limit;
        let new_intercept = segment.cost_at(column) - style.over_column_limit_penalty as f64 * columns_over_limit.max(0) as f64;
        let mut new_layout = segment.layout.clone();
        new_layout.item.indentation_spaces += amount;
        let new_span = amount + segment.span;

        result.push(LayoutFunctionSegment {
            column: indent_column,
            layout: new_layout,
            span: new_span,
            intercept: new_intercept,
            gradient: segment.gradient,
        });

        idx += 1;
        if idx >= lf.0.len() {
            break;
        }
        column = lf.0[idx].column;
        indent_column = column - amount;
    }
    LayoutFunction(result)
}

/// Places `right` immediately to the right of `left`, with `right`'s own
/// `spaces_before` as the gap. Falls back to a heavily-penalized `stack`
/// if `right` must start a new line.
pub fn juxtaposition(style: &BasicFormatStyle, left: &LayoutFunction, right: &LayoutFunction) -> LayoutFunction {
    assert!(!left.0.is_empty());
    assert!(!right.0.is_empty());

    if right.must_wrap() {
        log::warn!("juxtaposition: right-hand layout must wrap at its first token, falling back to stack");
        let mut result = stack(style, &[left.clone(), right.clone()]);
        for seg in &mut result.0 {
            seg.intercept += MUST_WRAP_VIOLATION_PENALTY;
        }
        return result;
    }

    let mut result = Vec::new();
    let mut li = 0usize;
    let mut column_l = 0i32;
    let mut column_r = left.0[0].span + right.0[0].layout.item.spaces_before;
    let mut ri = right.at_or_to_the_left_of(column_r);

    loop {
        let seg_l = left.0[li].clone();
        let seg_r = right.0[ri].clone();
        let columns_over_limit = column_r - style.column_limit;
        let new_intercept = seg_l.cost_at(column_l) + seg_r.cost_at(column_r)
            - style.over_column_limit_penalty as f64 * columns_over_limit.max(0) as f64;
        let new_gradient = seg_l.gradient + seg_r.gradient
            - if columns_over_limit >= 0 { style.over_column_limit_penalty } else { 0 };

        let mut new_layout = LayoutTree::leaf(LayoutItem {
            kind: LayoutKind::Juxtaposition,
            indentation_spaces: 0,
            spaces_before: seg_l.layout.item.spaces_before,
            must_wrap: seg_l.layout.item.must_wrap,
        });
        adopt_flatten(&seg_l.layout, &mut new_layout);
        adopt_flatten(&seg_r.layout, &mut new_layout);

        let new_span = seg_l.span + seg_r.span + seg_r.layout.item.spaces_before;

        result.push(LayoutFunctionSegment {
            column: column_l,
            layout: new_layout,
            span: new_span,
            intercept: new_intercept,
            gradient: new_gradient,
        });

        let next_li = li + 1;
        let next_column_l = left.0.get(next_li).map(|s| s.column);
        let next_ri = ri + 1;
        let next_column_r = right.0.get(next_ri).map(|s| s.column);

        if next_column_l.is_none() && next_column_r.is_none() {
            break;
        }

        let take_left = match (next_column_l, next_column_r) {
            (Some(ncl), Some(ncr)) => (ncl - column_l) <= (ncr - column_r),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => unreachable!(),
        };

        if take_left {
            let ncl = next_column_l.unwrap();
            column_l = ncl;
            column_r = ncl + left.0[next_li].span + seg_r.layout.item.spaces_before;
            li = next_li;
            ri = right.at_or_to_the_left_of(column_r);
        } else {
            let ncr = next_column_r.unwrap();
            column_r = ncr;
            column_l = ncr - seg_l.span - seg_r.layout.item.spaces_before;
            ri = next_ri;
        }
    }

    LayoutFunction(result)
}

fn juxtaposition_many(style: &BasicFormatStyle, lfs: &[LayoutFunction]) -> LayoutFunction {
    assert!(!lfs.is_empty());
    let mut iter = lfs.iter();
    let mut acc = iter.next().unwrap().clone();
    for lf in iter {
        acc = juxtaposition(style, &acc, lf);
    }
    acc
}

/// Places each sub-layout on its own line, sharing a column origin.
pub fn stack(style: &BasicFormatStyle, lfs: &[LayoutFunction]) -> LayoutFunction {
    assert!(!lfs.is_empty());
    let n = lfs.len();
    let line_breaks_penalty = (n as i32 - 1) as f64 * style.line_break_penalty as f64;

    let mut idxs = vec![0usize; n];
    let mut result = Vec::new();
    let mut current_column = 0i32;

    loop {
        for (k, lf) in lfs.iter().enumerate() {
            idxs[k] = lf.at_or_to_the_left_of(current_column);
        }

        let first_item = &lfs[0].0[idxs[0]].layout.item;
        let spaces_before = first_item.spaces_before;
        let must_wrap = first_item.must_wrap;
        let span = lfs[n - 1].0[idxs[n - 1]].span;

        let mut new_layout = LayoutTree::leaf(LayoutItem {
            kind: LayoutKind::Stack,
            indentation_spaces: 0,
            spaces_before,
            must_wrap,
        });
        let mut intercept = line_breaks_penalty;
        let mut gradient = 0i32;
        for (k, lf) in lfs.iter().enumerate() {
            let seg = &lf.0[idxs[k]];
            intercept += seg.cost_at(current_column);
            gradient += seg.gradient;
            adopt_flatten(&seg.layout, &mut new_layout);
        }

        result.push(LayoutFunctionSegment {
            column: current_column,
            layout: new_layout,
            span,
            intercept,
            gradient,
        });

        let mut next_column = INFINITY;
        for (k, lf) in lfs.iter().enumerate() {
            if let Some(seg) = lf.0.get(idxs[k] + 1) {
                if seg.column < next_column {
                    next_column = seg.column;
                }
            }
        }
        if next_column >= INFINITY {
            break;
        }
        current_column = next_column;
    }

    LayoutFunction(result)
}

/// Pointwise minimum of several cost functions, ties broken by lower
/// gradient then by earlier index (so identical inputs always choose the
/// same layout).
pub fn choice(_style: &BasicFormatStyle, lfs: Vec<LayoutFunction>) -> LayoutFunction {
    assert!(!lfs.is_empty());
    let n = lfs.len();
    let mut idxs = vec![0usize; n];
    let mut result = Vec::new();
    let mut last_min: Option<(usize, usize)> = None;
    let mut current_column = 0i32;

    loop {
        let mut next_knot = INFINITY;
        for (k, lf) in lfs.iter().enumerate() {
            idxs[k] = lf.at_or_to_the_left_of(current_column);
            if let Some(seg) = lf.0.get(idxs[k] + 1) {
                if seg.column < next_knot {
                    next_knot = seg.column;
                }
            }
        }

        loop {
            let mut min_k = 0usize;
            for k in 1..n {
                let a = lfs[min_k].0[idxs[min_k]].cost_at(current_column);
                let b = lfs[k].0[idxs[k]].cost_at(current_column);
                if b < a || (b == a && lfs[k].0[idxs[k]].gradient < lfs[min_k].0[idxs[min_k]].gradient) {
                    min_k = k;
                }
            }
            let min_seg = &lfs[min_k].0[idxs[min_k]];
            if last_min != Some((min_k, idxs[min_k])) {
                result.push(LayoutFunctionSegment {
                    column: current_column,
                    layout: min_seg.layout.clone(),
                    span: min_seg.span,
                    intercept: min_seg.cost_at(current_column),
                    gradient: min_seg.gradient,
                });
                last_min = Some((min_k, idxs[min_k]));
            }

            let mut next_column = next_knot;
            let min_cost = min_seg.cost_at(current_column);
            let min_gradient = min_seg.gradient;
            for k in 0..n {
                let seg = &lfs[k].0[idxs[k]];
                if seg.gradient >= min_gradient {
                    continue;
                }
                let gamma = (seg.cost_at(current_column) - min_cost) / (min_gradient - seg.gradient) as f64;
                let column = current_column + gamma.ceil() as i32;
                if column > current_column && column < next_column {
                    next_column = column;
                }
            }
            current_column = next_column;
            if current_column >= next_knot {
                break;
            }
        }

        if current_column >= INFINITY {
            break;
        }
    }

    LayoutFunction(result)
}

/// Recursively chooses between juxtaposing and stacking `lfs`, picking
/// whichever is cheaper at every column. The first element is laid out as
/// itself (optionally shifted by `first_indent`); the rest are wrapped
/// among themselves and either appended or hung at `hang_indent`.
pub fn wrap(style: &BasicFormatStyle, lfs: &[LayoutFunction], first_indent: i32, hang_indent: i32) -> LayoutFunction {
    assert!(!lfs.is_empty());
    let first = if first_indent != 0 { indent(style, &lfs[0], first_indent) } else { lfs[0].clone() };
    if lfs.len() == 1 {
        return first;
    }
    let rest = wrap(style, &lfs[1..], 0, hang_indent);
    let juxt = juxtaposition(style, &first, &rest);
    let rest_indented = indent(style, &rest, hang_indent.max(0));
    let stacked = stack(style, &[first, rest_indented]);
    choice(style, vec![juxt, stacked])
}

/// Recursively computes the optimal [`LayoutFunction`] for `node`.
pub fn calculate_optimal_layout(
    style: &BasicFormatStyle,
    tree: &TokenPartitionTree,
    tokens: &[PreFormatToken],
    node: NodeId,
) -> LayoutFunction {
    if tree.is_leaf(node) {
        let value = tree.value(node);
        if value.partition_policy == PartitionPolicy::Wrap && value.size() > 1 && value.size() < WRAP_TOKENS_LIMIT {
            return wrapped_line(style, tokens, value);
        }
        return layout_for_leaf(style, tokens, value);
    }

    let children = tree.children(node).to_vec();
    let policy = tree.value(node).partition_policy;
    let node_indent = tree.value(node).indentation_spaces;

    let layouts: Vec<LayoutFunction> = match policy {
        PartitionPolicy::Juxtaposition
        | PartitionPolicy::AlreadyFormatted
        | PartitionPolicy::Wrap
        | PartitionPolicy::FitOnLineElseExpand
        | PartitionPolicy::AppendFittingSubPartitions
        | PartitionPolicy::JuxtapositionOrIndentedStack => children
            .iter()
            .map(|&c| calculate_optimal_layout(style, tree, tokens, c))
            .collect(),
        PartitionPolicy::Stack
        | PartitionPolicy::AlwaysExpand
        | PartitionPolicy::TabularAlignment
        | PartitionPolicy::Uninitialized => children
            .iter()
            .map(|&c| {
                let child_indent = tree.value(c).indentation_spaces;
                let relative = child_indent - node_indent;
                let lf = calculate_optimal_layout(style, tree, tokens, c);
                if relative > 0 {
                    indent(style, &lf, relative)
                } else {
                    if relative < 0 {
                        log::warn!("child indentation below parent indentation, treating as 0");
                    }
                    lf
                }
            })
            .collect(),
        PartitionPolicy::Inline => Vec::new(),
    };

    match policy {
        PartitionPolicy::Juxtaposition => juxtaposition_many(style, &layouts),
        PartitionPolicy::Stack | PartitionPolicy::AlwaysExpand | PartitionPolicy::TabularAlignment => {
            stack(style, &layouts)
        }
        PartitionPolicy::Wrap => {
            let hang = if children.len() > 1 {
                (tree.value(children[1]).indentation_spaces - node_indent).max(0)
            } else {
                0
            };
            wrap(style, &layouts, 0, hang)
        }
        PartitionPolicy::JuxtapositionOrIndentedStack => {
            let juxtaposition_allowed = !layouts[1..].iter().any(|lf| lf.must_wrap());
            let indented: Vec<LayoutFunction> = children
                .iter()
                .zip(layouts.iter())
                .map(|(&c, lf)| {
                    let relative = (tree.value(c).indentation_spaces - node_indent).max(0);
                    indent(style, lf, relative)
                })
                .collect();
            let stacked = stack(style, &indented);
            if juxtaposition_allowed {
                let juxt = juxtaposition_many(style, &layouts);
                choice(style, vec![juxt, stacked])
            } else {
                stacked
            }
        }
        PartitionPolicy::AppendFittingSubPartitions | PartitionPolicy::FitOnLineElseExpand => {
            wrap(style, &layouts, 0, 0)
        }
        PartitionPolicy::AlreadyFormatted => {
            let all_inline = children.iter().all(|&c| tree.value(c).partition_policy == PartitionPolicy::Inline);
            if !all_inline {
                log::warn!("already_formatted partition has a non-inline child");
            }
            let mut layouts = layouts;
            if let Some(first) = layouts.first_mut() {
                first.set_must_wrap(true);
                let indent_amt = tree.value(children[0]).indentation_spaces.max(0);
                *first = indent(style, first, indent_amt);
            }
            juxtaposition_many(style, &layouts)
        }
        PartitionPolicy::Uninitialized => {
            log::warn!("unsupported partition policy: uninitialized, defaulting to stack");
            stack(style, &layouts)
        }
        PartitionPolicy::Inline => {
            log::warn!("inline partition should be a leaf; dropping its children");
            layout_for_leaf(style, tokens, tree.value(node))
        }
    }
}

/// Walks a winning [`LayoutTree`] pre-order, rebuilding a
/// `TokenPartitionTree` whose structure obeys token-range continuity.
struct TreeReconstructor<'t> {
    tokens: &'t [PreFormatToken],
    current_indentation: i32,
    lines: Vec<ReconstructedLine>,
    current_line: Option<usize>,
}

struct ReconstructedLine {
    indentation_spaces: i32,
    tokens_range: Range<usize>,
    inline_children: Vec<UnwrappedLine>,
}

impl<'t> TreeReconstructor<'t> {
    fn new(tokens: &'t [PreFormatToken], indentation: i32) -> Self {
        TreeReconstructor {
            tokens,
            current_indentation: indentation,
            lines: Vec::new(),
            current_line: None,
        }
    }

    fn traverse(&mut self, layout: &LayoutTree) {
        let saved_indentation = self.current_indentation;
        self.current_indentation += layout.item.indentation_spaces;

        match &layout.item.kind {
            LayoutKind::Line { tokens, .. } => self.traverse_line(tokens.clone(), layout.item.spaces_before),
            LayoutKind::Juxtaposition => {
                for child in &layout.children {
                    self.traverse(child);
                }
            }
            LayoutKind::Stack => self.traverse_stack(layout),
        }

        self.current_indentation = saved_indentation;
    }

    fn traverse_line(&mut self, tokens: Range<usize>, spaces_before: i32) {
        match self.current_line {
            None => {
                self.lines.push(ReconstructedLine {
                    indentation_spaces: self.current_indentation,
                    tokens_range: tokens,
                    inline_children: Vec::new(),
                });
                self.current_line = Some(self.lines.len() - 1);
            }
            Some(idx) => {
                let natural = self.tokens[tokens.start].before.spaces_required as i32;
                let line = &mut self.lines[idx];
                debug_assert_eq!(line.tokens_range.end, tokens.start);

                if spaces_before == natural {
                    if let Some(last) = line.inline_children.last_mut() {
                        last.span_up_to(tokens.end);
                    }
                    line.tokens_range.end = tokens.end;
                } else {
                    if line.inline_children.is_empty() {
                        let mut head = UnwrappedLine::with_policy(0, line.tokens_range.start, PartitionPolicy::Inline);
                        head.span_up_to(tokens.start);
                        line.inline_children.push(head);
                    } else {
                        line.inline_children.last_mut().unwrap().span_up_to(tokens.start);
                    }
                    let mut tail = UnwrappedLine::with_policy(spaces_before, tokens.start, PartitionPolicy::Inline);
                    tail.span_up_to(tokens.end);
                    line.inline_children.push(tail);
                    line.tokens_range.end = tokens.end;
                }
            }
        }
    }

    fn traverse_stack(&mut self, layout: &LayoutTree) {
        match layout.children.len() {
            0 => {}
            1 => self.traverse(&layout.children[0]),
            _ => {
                let hang_indentation = match self.current_line {
                    Some(idx) => already_formatted_partition_length(self.tokens, &self.lines[idx]) + layout.item.spaces_before,
                    None => self.current_indentation,
                };

                self.traverse(&layout.children[0]);

                let saved = self.current_indentation;
                self.current_indentation = hang_indentation;
                for child in &layout.children[1..] {
                    self.current_line = None;
                    self.traverse(child);
                }
                self.current_indentation = saved;
            }
        }
    }

    fn into_lines(self) -> (i32, Vec<ReconstructedLine>) {
        (self.current_indentation, self.lines)
    }
}

fn already_formatted_partition_length(tokens: &[PreFormatToken], line: &ReconstructedLine) -> i32 {
    let range = line.tokens_range.clone();
    if range.is_empty() {
        return 0;
    }
    let mut width = line.indentation_spaces;
    width += tokens[range.start].length() as i32;
    for i in (range.start + 1)..range.end {
        width += tokens[i].before.spaces_required as i32 + tokens[i].length() as i32;
    }
    for child in &line.inline_children {
        let crange = child.tokens_range();
        if crange.start != range.start {
            width -= tokens[crange.start].before.spaces_required as i32;
        }
        width += child.indentation_spaces;
    }
    width
}

fn commit_line(tree: &mut TokenPartitionTree, tokens: &mut [PreFormatToken], id: NodeId) {
    let _ = partition_tree::apply_already_formatted_partition_to_tokens(tree, tokens, id);
}

fn replace_with_reconstruction(
    tree: &mut TokenPartitionTree,
    tokens: &mut [PreFormatToken],
    node: NodeId,
    final_indentation: i32,
    lines: Vec<ReconstructedLine>,
) -> FormatResult<()> {
    if lines.is_empty() {
        return Err(FormatError::invariant("layout reconstruction produced no lines"));
    }

    tree.clear_children(node);
    if lines.len() == 1 {
        let line = lines.into_iter().next().unwrap();
        *tree.value_mut(node) =
            UnwrappedLine::with_policy(line.indentation_spaces, line.tokens_range.start, PartitionPolicy::AlreadyFormatted);
        tree.value_mut(node).span_up_to(line.tokens_range.end);
        for child in line.inline_children {
            tree.add_child(node, child);
        }
        commit_line(tree, tokens, node);
    } else {
        let first_start = lines[0].tokens_range.start;
        let last_end = lines[lines.len() - 1].tokens_range.end;
        *tree.value_mut(node) = UnwrappedLine::with_policy(final_indentation, first_start, PartitionPolicy::AlwaysExpand);
        tree.value_mut(node).span_up_to(last_end);
        for line in lines {
            let mut v = UnwrappedLine::with_policy(line.indentation_spaces, line.tokens_range.start, PartitionPolicy::AlreadyFormatted);
            v.span_up_to(line.tokens_range.end);
            let line_id = tree.add_child(node, v);
            for child in line.inline_children {
                tree.add_child(line_id, child);
            }
            commit_line(tree, tokens, line_id);
        }
    }
    Ok(())
}

/// Optimizes a single subtree in place: computes its `LayoutFunction`,
/// picks the segment at the node's own indentation, and reconstructs the
/// partition tree from the winning layout.
pub fn optimize(style: &BasicFormatStyle, tree: &mut TokenPartitionTree, tokens: &mut Vec<PreFormatToken>, node: NodeId) -> FormatResult<()> {
    let indentation = tree.value(node).indentation_spaces;
    let layout_function = calculate_optimal_layout(style, tree, tokens, node);
    if layout_function.is_empty() {
        return Err(FormatError::invariant("optimizer produced an empty layout function"));
    }
    let idx = layout_function.at_or_to_the_left_of(indentation);
    let chosen = layout_function.0[idx].layout.clone();

    let mut reconstructor = TreeReconstructor::new(tokens, indentation);
    reconstructor.traverse(&chosen);
    let (final_indentation, lines) = reconstructor.into_lines();
    replace_with_reconstruction(tree, tokens, node, final_indentation, lines)
}

fn is_optimizer_policy(policy: PartitionPolicy) -> bool {
    !matches!(policy, PartitionPolicy::Uninitialized | PartitionPolicy::Inline)
}

/// The top-level entry point: optimizes `node` only if its policy is one
/// the optimizer knows how to combine; otherwise leaves the tree alone.
pub fn optimize_token_partition_tree(
    style: &BasicFormatStyle,
    tree: &mut TokenPartitionTree,
    tokens: &mut Vec<PreFormatToken>,
    node: NodeId,
) -> FormatResult<()> {
    if !is_optimizer_policy(tree.value(node).partition_policy) {
        return Ok(());
    }
    log::debug!("optimizing partition {:?}, policy {}", node, tree.value(node).partition_policy);
    let result = optimize(style, tree, tokens, node);
    log::debug!("done optimizing partition {:?}", node);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unwrapped_line::UnwrappedLine;

    fn toks(words: &[&str]) -> Vec<PreFormatToken> {
        let mut offset = 0;
        let mut v = Vec::new();
        for w in words {
            let mut t = PreFormatToken::new(*w, offset);
            t.before.spaces_required = 1;
            offset += w.len() + 1;
            v.push(t);
        }
        v
    }

    // Three one-token lines of width 19, 50 (over the limit), and 10,
    // stacked at column_limit 40.
    #[test]
    fn stack_of_three_lines_matches_expected_segments() {
        let tokens = toks(&["x".repeat(19).as_str(), "y".repeat(50).as_str(), "z".repeat(10).as_str()]);
        let style = BasicFormatStyle {
            column_limit: 40,
            line_break_penalty: 2,
            over_column_limit_penalty: 100,
            ..Default::default()
        };
        let lines: Vec<LayoutFunction> = (0..3).map(|i| line(&style, &tokens, i..i + 1, 0, 0, false)).collect();
        let lf = stack(&style, &lines);
        let cols: Vec<i32> = lf.segments().iter().map(|s| s.column).collect();
        assert_eq!(cols, vec![0, 21, 30]);
        let intercepts: Vec<f64> = lf.segments().iter().map(|s| s.intercept).collect();
        assert_eq!(intercepts, vec![1004.0, 3104.0, 4904.0]);
        let gradients: Vec<i32> = lf.segments().iter().map(|s| s.gradient).collect();
        assert_eq!(gradients, vec![100, 200, 300]);
    }

    // `short` (19 cols) juxtaposed with a joinable 10-col line, column_limit
    // 40: fits up to column 11, then starts overflowing at 1 col/char past
    // that, crossing the limit again at column 21.
    #[test]
    fn juxtaposition_of_two_short_lines_matches_expected_segments() {
        let tokens = toks(&["x".repeat(19).as_str(), "y".repeat(10).as_str()]);
        let style = BasicFormatStyle {
            column_limit: 40,
            over_column_limit_penalty: 100,
            ..Default::default()
        };
        let left = line(&style, &tokens, 0..1, 0, 0, false);
        let right = line(&style, &tokens, 1..2, 0, 0, false);
        let lf = juxtaposition(&style, &left, &right);

        let cols: Vec<i32> = lf.segments().iter().map(|s| s.column).collect();
        assert_eq!(cols, vec![0, 11, 21]);
        let intercepts: Vec<f64> = lf.segments().iter().map(|s| s.intercept).collect();
        assert_eq!(intercepts, vec![0.0, 0.0, 1000.0]);
        let gradients: Vec<i32> = lf.segments().iter().map(|s| s.gradient).collect();
        assert_eq!(gradients, vec![0, 100, 100]);
    }

    #[test]
    fn line_under_limit_has_two_segments() {
        let tokens = toks(&["short"]);
        let style = BasicFormatStyle::default();
        let lf = line(&style, &tokens, 0..1, 0, 0, false);
        assert_eq!(lf.segments().len(), 2);
        assert_eq!(lf.segments()[0].gradient, 0);
        assert_eq!(lf.segments()[1].gradient, style.over_column_limit_penalty);
    }

    #[test]
    fn juxtaposition_falls_back_to_stack_when_right_must_wrap() {
        let mut tokens = toks(&["a", "b"]);
        tokens[1].before.break_decision = BreakDecision::MustWrap;
        let style = BasicFormatStyle::default();
        let left = line(&style, &tokens, 0..1, 0, 0, false);
        let right = line(&style, &tokens, 1..2, 0, 0, true);
        let result = juxtaposition(&style, &left, &right);
        assert!(result.segments()[0].intercept >= MUST_WRAP_VIOLATION_PENALTY);
    }

    #[test]
    fn optimizer_collapses_juxtaposition_to_already_formatted() {
        let mut tokens = toks(&["foo", "bar"]);
        let mut tree = TokenPartitionTree::new();
        let mut root = UnwrappedLine::with_policy(0, 0, PartitionPolicy::Juxtaposition);
        root.span_up_to(2);
        let root_id = tree.set_root(root);
        let mut a = UnwrappedLine::new(0, 0);
        a.span_up_to(1);
        tree.add_child(root_id, a);
        let mut b = UnwrappedLine::new(0, 1);
        b.span_up_to(2);
        tree.add_child(root_id, b);

        let style = BasicFormatStyle::default();
        optimize_token_partition_tree(&style, &mut tree, &mut tokens, root_id).unwrap();

        assert_eq!(tree.value(root_id).partition_policy, PartitionPolicy::AlreadyFormatted);
        assert_eq!(tree.value(root_id).tokens_range(), 0..2);
    }

    #[test]
    fn optimizer_stacks_when_line_would_overflow() {
        let mut tokens = toks(&["aaaaaaaaaaaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbbbbbbbbbbb"]);
        let mut tree = TokenPartitionTree::new();
        let mut root = UnwrappedLine::with_policy(0, 0, PartitionPolicy::Stack);
        root.span_up_to(2);
        let root_id = tree.set_root(root);
        let mut a = UnwrappedLine::new(0, 0);
        a.span_up_to(1);
        tree.add_child(root_id, a);
        let mut b = UnwrappedLine::new(0, 1);
        b.span_up_to(2);
        tree.add_child(root_id, b);

        let style = BasicFormatStyle { column_limit: 20, ..Default::default() };
        optimize_token_partition_tree(&style, &mut tree, &mut tokens, root_id).unwrap();

        assert_eq!(tree.value(root_id).partition_policy, PartitionPolicy::AlwaysExpand);
        assert_eq!(tree.children(root_id).len(), 2);
    }

    #[test]
    fn uninitialized_grouping_node_stacks_its_children_instead_of_panicking() {
        let mut tokens = toks(&["foo", "bar", "baz"]);
        let mut tree = TokenPartitionTree::new();
        let mut root = UnwrappedLine::with_policy(0, 0, PartitionPolicy::Stack);
        root.span_up_to(3);
        let root_id = tree.set_root(root);

        let mut a = UnwrappedLine::new(0, 0);
        a.span_up_to(1);
        tree.add_child(root_id, a);

        // A non-leaf child left at the default policy: a grouping node
        // whose own children still need laying out.
        let mut group = UnwrappedLine::new(0, 1);
        group.span_up_to(3);
        let group_id = tree.add_child(root_id, group);
        let mut b = UnwrappedLine::new(0, 1);
        b.span_up_to(2);
        tree.add_child(group_id, b);
        let mut c = UnwrappedLine::new(0, 2);
        c.span_up_to(3);
        tree.add_child(group_id, c);

        let style = BasicFormatStyle::default();
        let result = optimize_token_partition_tree(&style, &mut tree, &mut tokens, root_id);

        assert!(result.is_ok());
    }
}
