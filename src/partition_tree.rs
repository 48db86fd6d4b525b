//! The token-partition tree: a hierarchical slicing of the pre-format-token
//! array into units of work for the alignment engine and the layout
//! optimizer.
//!
//! Implemented as an arena (`Vec<Node>`) with parent/child links stored as
//! indices, rather than the pointer-based tree of the original
//! implementation. This makes sibling mutation (grouping, merging)
//! explicit and keeps invariant-checking a plain traversal.

use std::ops::Range;

use crate::error::{FormatError, FormatResult};
use crate::token::PreFormatToken;
use crate::unwrapped_line::{PartitionPolicy, UnwrappedLine};

/// Index of a node in a [`TokenPartitionTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
struct Node {
    value: UnwrappedLine,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Hierarchical partition of format tokens. Hard invariants (checked by
/// [`TokenPartitionTree::verify_node_ranges`] /
/// [`TokenPartitionTree::verify_full_tree_ranges`]):
///
/// - parent-child range equality: a parent's token range begins at its
///   first child's beginning and ends at its last child's end.
/// - sibling continuity: adjacent siblings' ranges touch exactly.
#[derive(Debug, Clone, Default)]
pub struct TokenPartitionTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl TokenPartitionTree {
    pub fn new() -> Self {
        TokenPartitionTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    fn alloc_node(&mut self, value: UnwrappedLine, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            value,
            parent,
            children: Vec::new(),
        });
        id
    }

    /// Sets (or replaces) the root node.
    pub fn set_root(&mut self, value: UnwrappedLine) -> NodeId {
        let id = self.alloc_node(value, None);
        self.root = Some(id);
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Appends a new child under `parent`, then re-derives `parent`'s
    /// (and its ancestors') token range from its children.
    pub fn add_child(&mut self, parent: NodeId, value: UnwrappedLine) -> NodeId {
        let id = self.alloc_node(value, Some(parent));
        self.nodes[parent.0 as usize].children.push(id);
        self.recompute_and_propagate(Some(parent));
        id
    }

    pub fn value(&self, id: NodeId) -> &UnwrappedLine {
        &self.nodes[id.0 as usize].value
    }

    pub fn value_mut(&mut self, id: NodeId) -> &mut UnwrappedLine {
        &mut self.nodes[id.0 as usize].value
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0 as usize].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.0 as usize].children.is_empty()
    }

    pub fn clear_children(&mut self, id: NodeId) {
        self.nodes[id.0 as usize].children.clear();
    }

    /// Re-derives a node's token range from its children's union, then
    /// walks upward doing the same for every ancestor. No-op for leaves.
    fn recompute_and_propagate(&mut self, mut node: Option<NodeId>) {
        while let Some(id) = node {
            let children = self.nodes[id.0 as usize].children.clone();
            if !children.is_empty() {
                let start = self.nodes[children[0].0 as usize]
                    .value
                    .tokens_range()
                    .start;
                let end = self.nodes[children[children.len() - 1].0 as usize]
                    .value
                    .tokens_range()
                    .end;
                let v = &mut self.nodes[id.0 as usize].value;
                v.span_back_to(start);
                v.span_up_to(end);
            }
            node = self.nodes[id.0 as usize].parent;
        }
    }

    // ---- Analysis (non-modifying) ----------------------------------

    /// Checks the parent-child range-equality and sibling-continuity
    /// invariants for `node` alone (not its descendants).
    pub fn verify_node_ranges(&self, node: NodeId) -> FormatResult<()> {
        let children = self.children(node);
        if children.is_empty() {
            return Ok(());
        }
        let parent_range = self.value(node).tokens_range();
        let first = self.value(children[0]).tokens_range();
        let last = self.value(children[children.len() - 1]).tokens_range();
        if parent_range.start != first.start {
            return Err(FormatError::invariant(format!(
                "parent range start {} != first child start {}",
                parent_range.start, first.start
            )));
        }
        if parent_range.end != last.end {
            return Err(FormatError::invariant(format!(
                "parent range end {} != last child end {}",
                parent_range.end, last.end
            )));
        }
        for w in children.windows(2) {
            let left = self.value(w[0]).tokens_range();
            let right = self.value(w[1]).tokens_range();
            if left.end != right.start {
                return Err(FormatError::invariant(format!(
                    "sibling discontinuity: {} != {}",
                    left.end, right.start
                )));
            }
        }
        if self.value(node).partition_policy == PartitionPolicy::AlreadyFormatted {
            for &c in children {
                if self.value(c).partition_policy != PartitionPolicy::Inline {
                    return Err(FormatError::invariant(
                        "AlreadyFormatted parent has a non-Inline child",
                    ));
                }
            }
        }
        if self.value(node).partition_policy == PartitionPolicy::Inline {
            return Err(FormatError::invariant(
                "Inline node must be a leaf but has children",
            ));
        }
        Ok(())
    }

    /// Recursive version of [`Self::verify_node_ranges`] covering the
    /// whole subtree rooted at `node`.
    pub fn verify_full_tree_ranges(&self, node: NodeId) -> FormatResult<()> {
        self.verify_node_ranges(node)?;
        for &c in self.children(node) {
            self.verify_full_tree_ranges(c)?;
        }
        Ok(())
    }

    /// Finds the leaf immediately preceding `node` in left-to-right
    /// (pre-order) order, which may be a distant cousin.
    pub fn previous_leaf(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = node;
        loop {
            let parent = self.parent(cur)?;
            let siblings = self.children(parent);
            let idx = siblings.iter().position(|&c| c == cur).unwrap();
            if idx > 0 {
                let mut n = siblings[idx - 1];
                while !self.is_leaf(n) {
                    n = *self.children(n).last().unwrap();
                }
                return Some(n);
            }
            cur = parent;
        }
    }

    /// Finds the leaf immediately following `node` in left-to-right
    /// (pre-order) order, which may be a distant cousin.
    pub fn next_leaf(&self, node: NodeId) -> Option<NodeId> {
        let mut cur = node;
        loop {
            let parent = self.parent(cur)?;
            let siblings = self.children(parent);
            let idx = siblings.iter().position(|&c| c == cur).unwrap();
            if idx + 1 < siblings.len() {
                let mut n = siblings[idx + 1];
                while !self.is_leaf(n) {
                    n = self.children(n)[0];
                }
                return Some(n);
            }
            cur = parent;
        }
    }

    /// Collects all leaves of the subtree rooted at `node`, in order.
    pub fn leaves(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(node, &mut out);
        out
    }

    fn collect_leaves(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.is_leaf(node) {
            out.push(node);
        } else {
            for &c in self.children(node) {
                self.collect_leaves(c, out);
            }
        }
    }

    // ---- Transformations (modifying) -------------------------------

    /// Applies `delta` to every node's indentation in the subtree rooted at
    /// `node`, clamped to >= 0.
    pub fn adjust_indent_relative(&mut self, node: NodeId, delta: i32) {
        let v = self.value_mut(node);
        v.indentation_spaces = (v.indentation_spaces + delta).max(0);
        let children: Vec<NodeId> = self.children(node).to_vec();
        for c in children {
            self.adjust_indent_relative(c, delta);
        }
    }

    /// Shifts every node in the subtree so that `node` itself ends up at
    /// `target` indentation.
    pub fn adjust_indent_absolute(&mut self, node: NodeId, target: i32) {
        let delta = target - self.value(node).indentation_spaces;
        self.adjust_indent_relative(node, delta);
    }

    /// Concatenates siblings `i` and `i+1` of `parent`. The resulting
    /// node's token range is their union; policy/indentation/origin are
    /// taken from the left sibling; children lists are concatenated.
    pub fn merge_consecutive_siblings(&mut self, parent: NodeId, i: usize) -> FormatResult<()> {
        let siblings = self.children(parent).to_vec();
        if siblings.len() < 2 || i + 1 >= siblings.len() {
            return Err(FormatError::invariant(
                "merge_consecutive_siblings: parent must have >= 2 children and valid index",
            ));
        }
        let left = siblings[i];
        let right = siblings[i + 1];
        let right_children = self.children(right).to_vec();
        let right_end = self.value(right).tokens_range().end;

        for c in &right_children {
            self.nodes[c.0 as usize].parent = Some(left);
        }
        self.nodes[left.0 as usize].children.extend(right_children);
        self.value_mut(left).span_up_to(right_end);

        self.nodes[parent.0 as usize].children.remove(i + 1);
        self.recompute_and_propagate(Some(parent));
        Ok(())
    }

    /// Groups `leaf` with the closest earlier leaf (possibly a distant
    /// cousin), taking indentation and policy from the earlier leaf. The
    /// grouping node is created in place of the preceding leaf. Returns
    /// `None` if no earlier leaf exists.
    pub fn group_leaf_with_previous_leaf(&mut self, leaf: NodeId) -> Option<NodeId> {
        let prev = self.previous_leaf(leaf)?;

        // Detach `leaf` from its current parent.
        let leaf_parent = self.parent(leaf);
        if let Some(p) = leaf_parent {
            self.nodes[p.0 as usize].children.retain(|&c| c != leaf);
        }

        let prev_value = self.value(prev).clone();
        let mut group_value = UnwrappedLine::with_policy(
            prev_value.indentation_spaces,
            prev_value.tokens_range().start,
            prev_value.partition_policy,
        );
        group_value.span_up_to(self.value(leaf).tokens_range().end);

        let prev_parent = self.parent(prev);
        let group_id = self.alloc_node(group_value, prev_parent);

        if let Some(pp) = prev_parent {
            let idx = self.children(pp).iter().position(|&c| c == prev).unwrap();
            self.nodes[pp.0 as usize].children[idx] = group_id;
        } else {
            self.root = Some(group_id);
        }

        self.nodes[prev.0 as usize].parent = Some(group_id);
        self.nodes[leaf.0 as usize].parent = Some(group_id);
        self.nodes[group_id.0 as usize].children = vec![prev, leaf];

        self.recompute_and_propagate(leaf_parent);
        self.recompute_and_propagate(prev_parent);
        Some(group_id)
    }

    /// Destroys `leaf` and extends the previous leaf's token range to
    /// cover it. Returns the former parent of `leaf` if the move occurred.
    pub fn merge_leaf_into_previous_leaf(&mut self, leaf: NodeId) -> Option<NodeId> {
        let prev = self.previous_leaf(leaf)?;
        let leaf_end = self.value(leaf).tokens_range().end;
        self.value_mut(prev).span_up_to(leaf_end);

        let parent = self.parent(leaf);
        if let Some(p) = parent {
            self.nodes[p.0 as usize].children.retain(|&c| c != leaf);
        }
        self.recompute_and_propagate(parent);
        self.recompute_and_propagate(self.parent(prev));
        parent
    }

    /// Destroys `leaf` and extends the next leaf's token range to cover
    /// it. Returns the former parent of `leaf` if the move occurred.
    pub fn merge_leaf_into_next_leaf(&mut self, leaf: NodeId) -> Option<NodeId> {
        let next = self.next_leaf(leaf)?;
        let leaf_start = self.value(leaf).tokens_range().start;
        self.value_mut(next).span_back_to(leaf_start);

        let parent = self.parent(leaf);
        if let Some(p) = parent {
            self.nodes[p.0 as usize].children.retain(|&c| c != leaf);
        }
        self.recompute_and_propagate(parent);
        self.recompute_and_propagate(self.parent(next));
        parent
    }

    /// Replaces the subtree at `at` with a (deep) copy of `other`'s
    /// subtree rooted at `other_root`, preserving `at`'s position in this
    /// tree (its parent link).
    pub fn replace_with_tree(&mut self, at: NodeId, other: &TokenPartitionTree, other_root: NodeId) {
        self.nodes[at.0 as usize].value = other.value(other_root).clone();
        let new_children = self.clone_children_from(other, other_root, at);
        self.nodes[at.0 as usize].children = new_children;
        let parent = self.parent(at);
        self.recompute_and_propagate(parent);
    }

    fn clone_children_from(
        &mut self,
        other: &TokenPartitionTree,
        other_node: NodeId,
        new_parent: NodeId,
    ) -> Vec<NodeId> {
        let mut result = Vec::new();
        for &child in other.children(other_node) {
            let child_value = other.value(child).clone();
            let new_id = self.alloc_node(child_value, Some(new_parent));
            let grandchildren = self.clone_children_from(other, child, new_id);
            self.nodes[new_id.0 as usize].children = grandchildren;
            result.push(new_id);
        }
        result
    }
}

/// Returns `true` iff any token spanned by `node` falls inside a disabled
/// byte-offset interval, based on each token's source offset span.
pub fn any_subrange_is_disabled(
    tree: &TokenPartitionTree,
    node: NodeId,
    tokens: &[PreFormatToken],
    disabled: &crate::byte_offset_set::ByteOffsetSet,
) -> bool {
    if disabled.is_empty() {
        return false;
    }
    let range = tree.value(node).tokens_range();
    for tok in &tokens[range] {
        let span = tok.source_offset..(tok.source_offset + tok.text.len());
        if disabled.overlaps(&span) {
            return true;
        }
    }
    false
}

/// Returns the `num_partitions` largest leaf partitions under `node`, by
/// token count, most tokens first.
pub fn find_largest_partitions(tree: &TokenPartitionTree, node: NodeId, num_partitions: usize) -> Vec<NodeId> {
    let mut leaves = tree.leaves(node);
    leaves.sort_by_key(|&id| std::cmp::Reverse(tree.value(id).size()));
    leaves.truncate(num_partitions);
    leaves
}

/// For every token in `partitions` except each partition's first, computes
/// `original_spacing - spaces_required`, grouped by partition. A perfectly
/// flush-left original spacing yields all zeros.
pub fn flush_left_spacing_differences(
    tree: &TokenPartitionTree,
    tokens: &[PreFormatToken],
    full_text: &str,
    partitions: &[NodeId],
) -> Vec<Vec<i32>> {
    partitions
        .iter()
        .map(|&id| {
            let range = tree.value(id).tokens_range();
            range
                .clone()
                .skip(1)
                .map(|i| {
                    let prev_end = tokens[i - 1].source_offset + tokens[i - 1].text.len();
                    let original_spacing = if prev_end <= tokens[i].source_offset && tokens[i].source_offset <= full_text.len() {
                        (tokens[i].source_offset - prev_end) as i32
                    } else {
                        tokens[i].before.spaces_required as i32
                    };
                    original_spacing - tokens[i].before.spaces_required as i32
                })
                .collect()
        })
        .collect()
}

/// Pretty-prints a `TokenPartitionTree`, suppressing token text at
/// non-leaf nodes (a parent's range always spans the union of its
/// children's, so printing it twice is redundant).
pub struct TokenPartitionTreePrinter<'a> {
    tree: &'a TokenPartitionTree,
    root: NodeId,
    tokens: &'a [PreFormatToken],
}

impl<'a> TokenPartitionTreePrinter<'a> {
    pub fn new(tree: &'a TokenPartitionTree, root: NodeId, tokens: &'a [PreFormatToken]) -> Self {
        TokenPartitionTreePrinter { tree, root, tokens }
    }

    fn print_node(&self, f: &mut std::fmt::Formatter<'_>, node: NodeId, depth: usize) -> std::fmt::Result {
        let value = self.tree.value(node);
        let indent = "  ".repeat(depth);
        if self.tree.is_leaf(node) {
            let range = value.tokens_range();
            let text: Vec<&str> = self.tokens[range].iter().map(|t| t.text.as_str()).collect();
            writeln!(
                f,
                "{indent}{{{} [{}] \"{}\"}}",
                value.partition_policy,
                value.indentation_spaces,
                text.join(" ")
            )?;
        } else {
            writeln!(f, "{indent}{{{} [{}]", value.partition_policy, value.indentation_spaces)?;
            for &child in self.tree.children(node) {
                self.print_node(f, child, depth + 1)?;
            }
            writeln!(f, "{indent}}}")?;
        }
        Ok(())
    }
}

impl<'a> std::fmt::Display for TokenPartitionTreePrinter<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.print_node(f, self.root, 0)
    }
}

/// From a contiguous run of sibling partitions (`siblings`, in order),
/// detects blank lines (two or more newlines) in the original source text
/// between adjacent partitions' token ranges, and returns sub-ranges
/// (indices into `siblings`) separated by them.
pub fn get_subpartitions_between_blank_lines(
    tree: &TokenPartitionTree,
    tokens: &[PreFormatToken],
    full_text: &str,
    siblings: &[NodeId],
) -> Vec<Range<usize>> {
    let blank_line = regex::Regex::new(r"\n[ \t\r]*\n").unwrap();
    let mut result = Vec::new();
    let mut start = 0usize;
    for i in 1..siblings.len() {
        let prev_range = tree.value(siblings[i - 1]).tokens_range();
        let next_range = tree.value(siblings[i]).tokens_range();
        if prev_range.end == 0 || next_range.is_empty() {
            continue;
        }
        let prev_tok = &tokens[prev_range.end - 1];
        let next_tok = &tokens[next_range.start];
        let gap_start = prev_tok.source_offset + prev_tok.text.len();
        let gap_end = next_tok.source_offset;
        if gap_end > gap_start && gap_end <= full_text.len() {
            let gap = &full_text[gap_start..gap_end];
            if blank_line.is_match(gap) {
                result.push(start..i);
                start = i;
            }
        }
    }
    result.push(start..siblings.len());
    result
}

/// Marks every non-first token of each partition in `siblings` to
/// `BreakDecision::Preserve`, leaving the first token of each partition
/// untouched so the formatter can still choose its indentation.
pub fn indent_but_preserve_other_spacing(
    tree: &TokenPartitionTree,
    tokens: &mut [PreFormatToken],
    siblings: &[NodeId],
) {
    use crate::token::BreakDecision;
    for &id in siblings {
        let range = tree.value(id).tokens_range();
        for i in range.clone() {
            if i == range.start {
                continue;
            }
            let prev_end = tokens[i - 1].source_offset + tokens[i - 1].text.len();
            tokens[i].before.break_decision = BreakDecision::Preserve;
            tokens[i].before.preserved_space_start = prev_end;
        }
    }
}

/// Finalizes an `AlreadyFormatted` partition: applies its (and its
/// `Inline` children's) spacing decisions to the underlying tokens, then
/// clears the node's children.
pub fn apply_already_formatted_partition_to_tokens(
    tree: &mut TokenPartitionTree,
    tokens: &mut [PreFormatToken],
    node: NodeId,
) -> FormatResult<()> {
    use crate::token::BreakDecision;

    let value = tree.value(node).clone();
    if value.partition_policy != PartitionPolicy::AlreadyFormatted {
        return Err(FormatError::invariant(
            "apply_already_formatted_partition_to_tokens: node is not AlreadyFormatted",
        ));
    }

    let children = tree.children(node).to_vec();
    if children.is_empty() {
        let range = value.tokens_range();
        if !range.is_empty() {
            tokens[range.start].before.break_decision = BreakDecision::MustWrap;
            tokens[range.start].before.spaces_required = value.indentation_spaces.max(0) as u32;
            for i in (range.start + 1)..range.end {
                tokens[i].before.break_decision = BreakDecision::MustAppend;
            }
        }
    } else {
        for (idx, &child) in children.iter().enumerate() {
            let child_value = tree.value(child).clone();
            if child_value.partition_policy != PartitionPolicy::Inline {
                return Err(FormatError::invariant(
                    "AlreadyFormatted parent has a non-Inline child",
                ));
            }
            let range = child_value.tokens_range();
            if range.is_empty() {
                continue;
            }
            if idx == 0 {
                tokens[range.start].before.break_decision = BreakDecision::MustWrap;
                tokens[range.start].before.spaces_required =
                    value.indentation_spaces.max(0) as u32;
            } else {
                tokens[range.start].before.break_decision = BreakDecision::AppendAligned;
                tokens[range.start].before.spaces_required =
                    child_value.indentation_spaces.max(0) as u32;
            }
            for i in (range.start + 1)..range.end {
                tokens[i].before.break_decision = BreakDecision::MustAppend;
            }
        }
    }

    tree.clear_children(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::PreFormatToken;

    fn toks(words: &[&str]) -> Vec<PreFormatToken> {
        let mut offset = 0;
        words
            .iter()
            .map(|w| {
                let t = PreFormatToken::new(*w, offset);
                offset += w.len() + 1;
                t
            })
            .collect()
    }

    fn build_flat_tree(n: usize) -> (TokenPartitionTree, NodeId, Vec<NodeId>) {
        let mut tree = TokenPartitionTree::new();
        let root = tree.set_root(UnwrappedLine::with_policy(
            0,
            0,
            PartitionPolicy::AlwaysExpand,
        ));
        let mut leaves = Vec::new();
        for i in 0..n {
            let mut line = UnwrappedLine::new(0, i);
            line.span_up_to(i + 1);
            leaves.push(tree.add_child(root, line));
        }
        (tree, root, leaves)
    }

    #[test]
    fn verify_full_tree_ranges_passes_for_well_formed_tree() {
        let (tree, root, _) = build_flat_tree(4);
        assert!(tree.verify_full_tree_ranges(root).is_ok());
    }

    #[test]
    fn verify_node_ranges_detects_sibling_gap() {
        let mut tree = TokenPartitionTree::new();
        let root = tree.set_root(UnwrappedLine::new(0, 0));
        let mut a = UnwrappedLine::new(0, 0);
        a.span_up_to(1);
        let mut b = UnwrappedLine::new(0, 2); // gap: should start at 1
        b.span_up_to(3);
        tree.add_child(root, a);
        tree.add_child(root, b);
        assert!(tree.verify_node_ranges(root).is_err());
    }

    #[test]
    fn adjust_indent_relative_clamps_at_zero() {
        let (mut tree, root, leaves) = build_flat_tree(2);
        tree.adjust_indent_relative(root, -100);
        assert_eq!(tree.value(root).indentation_spaces, 0);
        assert_eq!(tree.value(leaves[0]).indentation_spaces, 0);
    }

    #[test]
    fn adjust_indent_absolute_shifts_whole_subtree() {
        let (mut tree, root, leaves) = build_flat_tree(2);
        tree.adjust_indent_relative(root, 4);
        tree.adjust_indent_absolute(root, 10);
        assert_eq!(tree.value(root).indentation_spaces, 10);
        assert_eq!(tree.value(leaves[0]).indentation_spaces, 10);
        assert_eq!(tree.value(leaves[1]).indentation_spaces, 10);
    }

    #[test]
    fn merge_consecutive_siblings_unions_ranges() {
        let (mut tree, root, _) = build_flat_tree(3);
        tree.merge_consecutive_siblings(root, 0).unwrap();
        let children = tree.children(root);
        assert_eq!(children.len(), 2);
        assert_eq!(tree.value(children[0]).tokens_range(), 0..2);
        assert!(tree.verify_full_tree_ranges(root).is_ok());
    }

    #[test]
    fn group_leaf_with_previous_leaf_creates_parent() {
        let (mut tree, root, leaves) = build_flat_tree(3);
        let group = tree.group_leaf_with_previous_leaf(leaves[2]).unwrap();
        assert_eq!(tree.children(group), &[leaves[1], leaves[2]]);
        assert_eq!(tree.value(group).tokens_range(), 1..3);
        let _ = root;
    }

    #[test]
    fn group_leaf_with_previous_leaf_returns_none_when_no_earlier_leaf() {
        let (mut tree, _root, leaves) = build_flat_tree(3);
        assert!(tree.group_leaf_with_previous_leaf(leaves[0]).is_none());
    }

    #[test]
    fn merge_leaf_into_previous_leaf_extends_and_destroys() {
        let (mut tree, root, leaves) = build_flat_tree(3);
        tree.merge_leaf_into_previous_leaf(leaves[1]);
        assert_eq!(tree.children(root).len(), 2);
        assert_eq!(tree.value(tree.children(root)[0]).tokens_range(), 0..2);
    }

    #[test]
    fn any_subrange_is_disabled_detects_overlap() {
        use crate::byte_offset_set::ByteOffsetSet;
        let tokens = toks(&["a", "b", "c"]);
        let (tree, root, leaves) = build_flat_tree(3);
        let disabled = ByteOffsetSet::from_intervals(vec![2..3]);
        assert!(any_subrange_is_disabled(&tree, leaves[1], &tokens, &disabled));
        assert!(!any_subrange_is_disabled(&tree, leaves[0], &tokens, &disabled));
        let _ = root;
    }

    #[test]
    fn find_largest_partitions_orders_by_token_count_descending() {
        let mut tree = TokenPartitionTree::new();
        let root = tree.set_root(UnwrappedLine::with_policy(0, 0, PartitionPolicy::AlwaysExpand));
        let mut a = UnwrappedLine::new(0, 0);
        a.span_up_to(1);
        let mut b = UnwrappedLine::new(0, 1);
        b.span_up_to(4);
        let mut c = UnwrappedLine::new(0, 4);
        c.span_up_to(5);
        let leaf_a = tree.add_child(root, a);
        let leaf_b = tree.add_child(root, b);
        let _leaf_c = tree.add_child(root, c);

        let largest = find_largest_partitions(&tree, root, 2);
        assert_eq!(largest.len(), 2);
        assert_eq!(largest[0], leaf_b);
        assert_eq!(tree.value(largest[1]).size(), tree.value(leaf_a).size());
    }

    #[test]
    fn flush_left_spacing_differences_is_zero_for_perfectly_flush_text() {
        let full_text = "one two three";
        let mut tokens = vec![
            PreFormatToken::new("one", 0),
            PreFormatToken::new("two", 4),
            PreFormatToken::new("three", 8),
        ];
        tokens[1].before.spaces_required = 1;
        tokens[2].before.spaces_required = 1;
        let (tree, _root, leaves) = build_flat_tree(1);
        let mut row = tree.clone();
        row.clear_children(leaves[0]);
        *row.value_mut(leaves[0]) = UnwrappedLine::new(0, 0);
        row.value_mut(leaves[0]).span_up_to(3);

        let diffs = flush_left_spacing_differences(&row, &tokens, full_text, &[leaves[0]]);
        assert_eq!(diffs, vec![vec![0, 0]]);
    }

    #[test]
    fn flush_left_spacing_differences_reports_extra_original_spacing() {
        let full_text = "one    two";
        let mut tokens = vec![PreFormatToken::new("one", 0), PreFormatToken::new("two", 7)];
        tokens[1].before.spaces_required = 1;
        let (tree, _root, leaves) = build_flat_tree(1);
        let mut row = tree.clone();
        row.clear_children(leaves[0]);
        *row.value_mut(leaves[0]) = UnwrappedLine::new(0, 0);
        row.value_mut(leaves[0]).span_up_to(2);

        let diffs = flush_left_spacing_differences(&row, &tokens, full_text, &[leaves[0]]);
        assert_eq!(diffs, vec![vec![3]]);
    }

    #[test]
    fn printer_suppresses_text_at_non_leaf_nodes() {
        let tokens = toks(&["a", "b", "c"]);
        let (tree, root, _leaves) = build_flat_tree(3);
        let rendered = TokenPartitionTreePrinter::new(&tree, root, &tokens).to_string();
        assert!(rendered.contains("\"a\""));
        assert!(rendered.contains("\"b\""));
        assert!(rendered.contains("\"c\""));
        let root_line = rendered.lines().next().unwrap();
        assert!(!root_line.contains('"'));
    }

    #[test]
    fn blank_line_splits_subpartitions() {
        let full_text = "one\n\ntwo\nthree";
        let tokens = vec![
            PreFormatToken::new("one", 0),
            PreFormatToken::new("two", 5),
            PreFormatToken::new("three", 9),
        ];
        let (tree, _root, leaves) = build_flat_tree(3);
        let ranges = get_subpartitions_between_blank_lines(&tree, &tokens, full_text, &leaves);
        assert_eq!(ranges, vec![0..1, 1..3]);
    }

    #[test]
    fn apply_already_formatted_sets_decisions_and_clears_children() {
        use crate::token::BreakDecision;
        let mut tokens = toks(&["a", "b", "c"]);
        let mut tree = TokenPartitionTree::new();
        let root = tree.set_root(UnwrappedLine::with_policy(
            2,
            0,
            PartitionPolicy::AlreadyFormatted,
        ));
        let mut inline0 = UnwrappedLine::with_policy(2, 0, PartitionPolicy::Inline);
        inline0.span_up_to(2);
        let mut inline1 = UnwrappedLine::with_policy(1, 2, PartitionPolicy::Inline);
        inline1.span_up_to(3);
        tree.add_child(root, inline0);
        tree.add_child(root, inline1);

        apply_already_formatted_partition_to_tokens(&mut tree, &mut tokens, root).unwrap();

        assert_eq!(tokens[0].before.break_decision, BreakDecision::MustWrap);
        assert_eq!(tokens[0].before.spaces_required, 2);
        assert_eq!(tokens[1].before.break_decision, BreakDecision::MustAppend);
        assert_eq!(tokens[2].before.break_decision, BreakDecision::AppendAligned);
        assert_eq!(tokens[2].before.spaces_required, 1);
        assert!(tree.children(root).is_empty());
    }
}
