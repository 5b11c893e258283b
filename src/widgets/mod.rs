use hashbrown::{HashMap, HashSet};

use crate::collection::classify::CgroupType;
use crate::stats::DisplayRow;
use crate::utils::parent_path;

/// Connector pieces drawn in front of a cgroup name in tree view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeGlyph {
    Corner,
    Tee,
    HLine,
    VLine,
    Blank,
    Folded,
}

impl TreeGlyph {
    pub fn as_char(&self) -> char {
        match self {
            TreeGlyph::Corner => '└',
            TreeGlyph::Tee => '├',
            TreeGlyph::HLine => '─',
            TreeGlyph::VLine => '│',
            TreeGlyph::Blank => ' ',
            TreeGlyph::Folded => '+',
        }
    }
}

pub fn glyphs_to_string(glyphs: &[TreeGlyph]) -> String {
    glyphs.iter().map(TreeGlyph::as_char).collect()
}

/// A row ready to be painted, with its tree connectors (empty in list view).
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLine<'a> {
    pub row: &'a DisplayRow,
    pub glyphs: Vec<TreeGlyph>,
}

impl<'a> TreeLine<'a> {
    fn flat(row: &'a DisplayRow) -> Self {
        Self {
            row,
            glyphs: Vec::new(),
        }
    }
}

/// Children of each cgroup path, in input order.
pub type CGroupTree<'a> = HashMap<String, Vec<&'a DisplayRow>>;

/// Apply list/tree mode, the type filter and the fold set to already sorted rows.
pub fn prepare_view<'a, I>(
    rows: I,
    tree: bool,
    types: &HashSet<CgroupType>,
    fold: &HashSet<String>,
) -> Vec<TreeLine<'a>>
where
    I: IntoIterator<Item = &'a DisplayRow>,
{
    if !tree {
        return rows
            .into_iter()
            .filter(|row| types.is_empty() || types.contains(&row.kind))
            .map(TreeLine::flat)
            .collect();
    }

    let (mut rendered, mut children) = build_tree(rows);

    if !types.is_empty() {
        filter_tree(&mut children, types, "/");
    }

    if !fold.contains("/") {
        render_tree(&mut rendered, &children, fold, &[], "/");
    }
    rendered
}

/// Group rows under their parent path. The root has no parent and is returned apart.
pub fn build_tree<'a, I>(rows: I) -> (Vec<TreeLine<'a>>, CGroupTree<'a>)
where
    I: IntoIterator<Item = &'a DisplayRow>,
{
    let mut roots = Vec::new();
    let mut children: CGroupTree<'a> = HashMap::new();

    for row in rows {
        let parent = parent_path(&row.cgroup);
        if parent == row.cgroup {
            roots.push(TreeLine::flat(row));
            continue;
        }
        children.entry(parent.to_string()).or_default().push(row);
    }

    (roots, children)
}

/// Keep a branch if and only if it is of a `keep` type or has a descendant that is.
///
/// Returns whether anything survived below `node`.
pub fn filter_tree(tree: &mut CGroupTree<'_>, keep: &HashSet<CgroupType>, node: &str) -> bool {
    let Some(candidates) = tree.get(node).cloned() else {
        return false;
    };

    let mut filtered = Vec::with_capacity(candidates.len());
    for row in candidates {
        let has_kept_descendant = filter_tree(tree, keep, &row.cgroup);
        if has_kept_descendant || keep.contains(&row.kind) {
            filtered.push(row);
        }
    }

    if filtered.is_empty() {
        tree.remove(node);
        false
    } else {
        tree.insert(node.to_string(), filtered);
        true
    }
}

/// Depth first walk from `node`, attaching connectors to each row.
pub fn render_tree<'a>(
    out: &mut Vec<TreeLine<'a>>,
    tree: &CGroupTree<'a>,
    fold: &HashSet<String>,
    prefix: &[TreeGlyph],
    node: &str,
) {
    let Some(children) = tree.get(node) else {
        return;
    };

    for (i, row) in children.iter().enumerate() {
        let mut glyphs = prefix.to_vec();
        let mut child_prefix = prefix.to_vec();

        if i == children.len() - 1 {
            glyphs.extend([TreeGlyph::Corner, TreeGlyph::HLine, TreeGlyph::Blank]);
            child_prefix.extend([TreeGlyph::Blank; 3]);
        } else {
            glyphs.extend([TreeGlyph::Tee, TreeGlyph::HLine, TreeGlyph::Blank]);
            child_prefix.extend([TreeGlyph::VLine, TreeGlyph::Blank, TreeGlyph::Blank]);
        }

        if fold.contains(&row.cgroup) {
            let folded = glyphs.len() - 2;
            glyphs[folded] = TreeGlyph::Folded;
            out.push(TreeLine { row, glyphs });
        } else {
            out.push(TreeLine { row, glyphs });
            render_tree(out, tree, fold, &child_prefix, &row.cgroup);
        }
    }
}
