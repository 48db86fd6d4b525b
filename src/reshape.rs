//! Reshaping a "header + argument list" partition into line-sized groups,
//! for the `append_fitting_sub_partitions` partition policy.

use crate::error::FormatResult;
use crate::partition_tree::{NodeId, TokenPartitionTree};
use crate::style::BasicFormatStyle;
use crate::token::PreFormatToken;
use crate::unwrapped_line::{PartitionPolicy, UnwrappedLine};

fn partition_width(tokens: &[PreFormatToken], value: &UnwrappedLine) -> i32 {
    let range = value.tokens_range();
    if range.is_empty() {
        return 0;
    }
    let mut width = tokens[range.start].length() as i32;
    for i in (range.start + 1)..range.end {
        width += tokens[i].before.spaces_required as i32 + tokens[i].length() as i32;
    }
    width
}

struct Group {
    indentation_spaces: i32,
    members: Vec<NodeId>,
}

/// Greedily packs `header` followed by `args` into line-sized groups: the
/// header plus as many leading args as fit under `column_limit`, then
/// further args into subsequent groups aligned under the header's end.
fn greedy_group(
    style: &BasicFormatStyle,
    tree: &TokenPartitionTree,
    tokens: &[PreFormatToken],
    node_indent: i32,
    header: NodeId,
    args: &[NodeId],
) -> Vec<Group> {
    let header_width = partition_width(tokens, tree.value(header));
    let continuation_indent = node_indent + header_width;

    let mut groups = Vec::new();
    let mut current = vec![header];
    let mut current_width = node_indent + header_width;
    let mut current_indent = node_indent;

    for &arg in args {
        let arg_value = tree.value(arg);
        let arg_range = arg_value.tokens_range();
        let gap = if arg_range.is_empty() { 0 } else { tokens[arg_range.start].before.spaces_required as i32 };
        let arg_width = partition_width(tokens, arg_value);
        let candidate = current_width + gap + arg_width;

        if candidate <= style.column_limit {
            current.push(arg);
            current_width = candidate;
        } else {
            groups.push(Group {
                indentation_spaces: current_indent,
                members: std::mem::take(&mut current),
            });
            current_indent = continuation_indent;
            current = vec![arg];
            current_width = continuation_indent + arg_width;
        }
    }
    groups.push(Group {
        indentation_spaces: current_indent,
        members: current,
    });
    groups
}

/// Rebuilds `node`'s children as one `FitOnLineElseExpand` group per
/// `groups` entry, deep-copying each original child partition under its
/// new group.
fn rebuild(tree: &mut TokenPartitionTree, node: NodeId, groups: Vec<Group>) {
    let snapshot = tree.clone();
    tree.clear_children(node);

    for group in groups {
        if group.members.is_empty() {
            continue;
        }
        let first_range = snapshot.value(group.members[0]).tokens_range();
        let last_range = snapshot.value(*group.members.last().unwrap()).tokens_range();
        let mut group_value = UnwrappedLine::with_policy(group.indentation_spaces, first_range.start, PartitionPolicy::FitOnLineElseExpand);
        group_value.span_up_to(last_range.end);
        let group_id = tree.add_child(node, group_value);

        for &member in &group.members {
            let placeholder = tree.add_child(group_id, snapshot.value(member).clone());
            tree.replace_with_tree(placeholder, &snapshot, member);
        }
    }
}

/// Reshapes `node`'s children (assumed to already be `header, arg_1, ...,
/// arg_k`, with any trailer already folded into the last arg's token
/// range) into fitting subgroups. A no-op if `node` has fewer than two
/// children.
pub fn reshape_fitting_subpartitions(
    style: &BasicFormatStyle,
    tree: &mut TokenPartitionTree,
    tokens: &[PreFormatToken],
    node: NodeId,
) -> FormatResult<()> {
    let children = tree.children(node).to_vec();
    if children.len() < 2 {
        return Ok(());
    }
    let header = children[0];
    let args = &children[1..];
    let node_indent = tree.value(node).indentation_spaces;

    let groups = greedy_group(style, tree, tokens, node_indent, header, args);
    let nothing_fit = groups.iter().all(|g| g.members.len() <= 1);

    let groups = if nothing_fit {
        let mut flat = vec![Group {
            indentation_spaces: node_indent,
            members: vec![header],
        }];
        for &arg in args {
            flat.push(Group {
                indentation_spaces: node_indent + style.wrap_spaces,
                members: vec![arg],
            });
        }
        flat
    } else {
        groups
    };

    rebuild(tree, node, groups);
    Ok(())
}
