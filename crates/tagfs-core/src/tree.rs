//! Hierarchical folder view derived from flat slash-delimited paths.
//!
//! Folders are synthesized from path segments and never stored. Every record
//! lands in exactly one folder: the one named by its path minus the final
//! segment. Child folders are kept in a `BTreeMap`, so traversal visits them
//! in name order; records keep the order of the (sorted) input.

use crate::record::Record;
use std::collections::BTreeMap;

/// A synthesized folder node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderNode {
    /// Segment name (empty for the root)
    name: String,
    /// Full folder path, e.g. `docs/notes` (empty for the root)
    path: String,
    /// Records whose path terminates directly in this folder
    records: Vec<Record>,
    /// Child folders keyed by segment name
    children: BTreeMap<String, FolderNode>,
}

/// One step of a depth-first walk over the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntry<'a> {
    Folder { node: &'a FolderNode, depth: usize },
    Record { record: &'a Record, depth: usize },
}

impl FolderNode {
    fn child(name: &str, parent_path: &str) -> Self {
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        };
        Self {
            name: name.to_string(),
            path,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty() && self.name.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Child folders in name order.
    pub fn children(&self) -> impl Iterator<Item = &FolderNode> {
        self.children.values()
    }

    /// Look up a folder by its slash-separated path. The empty path is the root.
    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('/')
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    /// Total records in this subtree.
    pub fn record_count(&self) -> usize {
        self.records.len() + self.children.values().map(Self::record_count).sum::<usize>()
    }

    /// Every record path in this subtree, in display order.
    pub fn record_paths(&self) -> Vec<&str> {
        self.walk()
            .into_iter()
            .filter_map(|entry| match entry {
                TreeEntry::Record { record, .. } => Some(record.path()),
                TreeEntry::Folder { .. } => None,
            })
            .collect()
    }

    /// Depth-first walk: at each folder, subfolders by name first, then records.
    ///
    /// The node itself is not included; its children start at depth 0.
    pub fn walk(&self) -> Vec<TreeEntry<'_>> {
        let mut out = Vec::new();
        self.walk_into(0, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, depth: usize, out: &mut Vec<TreeEntry<'a>>) {
        for child in self.children.values() {
            out.push(TreeEntry::Folder { node: child, depth });
            child.walk_into(depth + 1, out);
        }
        for record in &self.records {
            out.push(TreeEntry::Record { record, depth });
        }
    }
}

/// Group records into a folder tree.
///
/// Precondition: `records` is sorted by full path. The builder does not sort;
/// use [`build_tree_sorted`] for arbitrary input.
pub fn build_tree<'a, I>(records: I) -> FolderNode
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut root = FolderNode::default();
    for record in records {
        let mut folders: Vec<&str> = record.segments().collect();
        // Final segment names the record itself
        folders.pop();

        let mut current = &mut root;
        for segment in folders {
            let parent_path = current.path.clone();
            current = current
                .children
                .entry(segment.to_string())
                .or_insert_with(|| FolderNode::child(segment, &parent_path));
        }
        current.records.push(record.clone());
    }
    root
}

/// Sort by path, then group. The result depends only on the record set.
pub fn build_tree_sorted(records: &[Record]) -> FolderNode {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| a.path().cmp(b.path()));
    build_tree(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(paths: &[&str]) -> Vec<Record> {
        paths.iter().map(|p| Record::new(*p).unwrap()).collect()
    }

    fn folder_of<'a>(root: &'a FolderNode, path: &str) -> &'a FolderNode {
        root.find(path).unwrap_or_else(|| panic!("missing folder {path}"))
    }

    #[test]
    fn test_root_and_nested_placement() {
        let tree = build_tree_sorted(&records(&["a.txt", "dir/b.txt"]));

        assert!(tree.is_root());
        assert_eq!(tree.records().len(), 1);
        assert_eq!(tree.records()[0].path(), "a.txt");

        let dir = folder_of(&tree, "dir");
        assert_eq!(dir.name(), "dir");
        assert_eq!(dir.records()[0].path(), "dir/b.txt");
        assert_eq!(dir.records()[0].file_name(), "b.txt");
    }

    #[test]
    fn test_intermediate_folders_are_synthesized_empty() {
        let tree = build_tree_sorted(&records(&["x/y/z/deep.md"]));

        let x = folder_of(&tree, "x");
        let y = folder_of(&tree, "x/y");
        let z = folder_of(&tree, "x/y/z");
        assert!(x.records().is_empty());
        assert!(y.records().is_empty());
        assert_eq!(z.path(), "x/y/z");
        assert_eq!(z.records().len(), 1);
    }

    #[test]
    fn test_every_record_in_exactly_one_folder() {
        let input = records(&["a", "b/c", "b/d/e", "b/d/f", "g/h", "b/i"]);
        let tree = build_tree_sorted(&input);

        assert_eq!(tree.record_count(), input.len());
        for record in &input {
            let parent = record
                .path()
                .rsplit_once('/')
                .map(|(folder, _)| folder)
                .unwrap_or("");
            let folder = folder_of(&tree, parent);
            let hits = folder
                .records()
                .iter()
                .filter(|r| r.path() == record.path())
                .count();
            assert_eq!(hits, 1, "{} should appear once in {parent:?}", record.path());
        }
    }

    #[test]
    fn test_shuffled_input_builds_identical_tree() {
        let sorted = records(&["a.txt", "docs/a.md", "docs/b.md", "docs/x/y.md", "z/q"]);
        let mut shuffled = sorted.clone();
        shuffled.reverse();
        shuffled.swap(0, 2);

        assert_eq!(build_tree_sorted(&sorted), build_tree_sorted(&shuffled));
        assert_eq!(build_tree_sorted(&sorted), build_tree_sorted(&sorted));
    }

    #[test]
    fn test_walk_lists_subfolders_before_files() {
        let tree = build_tree_sorted(&records(&["top.txt", "beta/two", "alpha/one", "alpha/sub/three"]));

        let rendered: Vec<String> = tree
            .walk()
            .into_iter()
            .map(|entry| match entry {
                TreeEntry::Folder { node, depth } => format!("{depth}:{}/", node.name()),
                TreeEntry::Record { record, depth } => format!("{depth}:{}", record.file_name()),
            })
            .collect();

        assert_eq!(
            rendered,
            vec![
                "0:alpha/",
                "1:sub/",
                "2:three",
                "1:one",
                "0:beta/",
                "1:two",
                "0:top.txt",
            ]
        );
    }

    #[test]
    fn test_record_paths_of_subtree() {
        let tree = build_tree_sorted(&records(&["docs/a", "docs/sub/b", "other/c"]));
        let docs = folder_of(&tree, "docs");
        assert_eq!(docs.record_paths(), vec!["docs/sub/b", "docs/a"]);
        assert!(tree.find("nope").is_none());
    }

    #[test]
    fn test_empty_segments_are_kept_literally() {
        let tree = build_tree_sorted(&records(&["a//b"]));
        let empty = folder_of(&tree, "a/");
        assert_eq!(empty.name(), "");
        assert_eq!(empty.records()[0].path(), "a//b");
    }
}
