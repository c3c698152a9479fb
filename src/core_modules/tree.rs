// THEORY:
// The in-memory form of a trained decision forest. Parsing tree files is the
// job of an external loader; this module only defines what a loaded tree looks
// like, checks that it is structurally sound, and knows how to walk it.
//
// A tree of height `h` is stored as a complete binary tree in breadth-first
// order: `2^h - 1` split nodes followed by `2^h` leaves. Walking never needs
// child pointers: from node `i` the left child is `2i + 1` and the right child
// is `2i + 2`. After `h` splits the index lands in the leaf range.

use crate::core_modules::body_part::{Label, NUM_PARTS};
use crate::error::{DetectorError, Result};

/// Trees deeper than this are rejected as malformed.
pub const MAX_TREE_HEIGHT: u32 = 20;

/// A split node: a depth-difference feature between two pixel offsets and
/// the threshold it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Node {
    pub du1: i16,
    pub dv1: i16,
    pub du2: i16,
    pub dv2: i16,
    pub threshold: i16,
}

impl Node {
    pub fn new(du1: i16, dv1: i16, du2: i16, dv2: i16, threshold: i16) -> Self {
        Self {
            du1,
            dv1,
            du2,
            dv2,
            threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    height: u32,
    nodes: Vec<Node>,
    leaves: Vec<Label>,
}

impl Tree {
    /// Builds a tree, checking the complete-binary-tree layout and the leaf labels.
    pub fn new(height: u32, nodes: Vec<Node>, leaves: Vec<Label>) -> Result<Self> {
        let tree = Self {
            height,
            nodes,
            leaves,
        };
        tree.validate().map_err(|reason| DetectorError::MalformedTree { index: 0, reason })?;
        Ok(tree)
    }

    /// A height-0 tree that labels every pixel `label`.
    pub fn constant(label: Label) -> Self {
        Self {
            height: 0,
            nodes: Vec::new(),
            leaves: vec![label],
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.height > MAX_TREE_HEIGHT {
            return Err(format!("height {} exceeds {}", self.height, MAX_TREE_HEIGHT));
        }
        let num_leaves = 1usize << self.height;
        if self.nodes.len() != num_leaves - 1 {
            return Err(format!(
                "height {} needs {} split nodes, got {}",
                self.height,
                num_leaves - 1,
                self.nodes.len()
            ));
        }
        if self.leaves.len() != num_leaves {
            return Err(format!(
                "height {} needs {} leaves, got {}",
                self.height,
                num_leaves,
                self.leaves.len()
            ));
        }
        if let Some(bad) = self.leaves.iter().find(|&&l| l as usize >= NUM_PARTS) {
            return Err(format!("leaf label {} is out of range", bad));
        }
        Ok(())
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn leaves(&self) -> &[Label] {
        &self.leaves
    }

    /// Walks from the root to a leaf. `feature` evaluates a split node; the walk
    /// goes right when the feature exceeds the node's threshold.
    #[inline]
    pub fn descend(&self, mut feature: impl FnMut(&Node) -> i32) -> Label {
        let mut idx = 0usize;
        for _ in 0..self.height {
            let node = &self.nodes[idx];
            let go_right = feature(node) > node.threshold as i32;
            idx = 2 * idx + 1 + go_right as usize;
        }
        self.leaves[idx - self.nodes.len()]
    }
}

/// Anything that can produce a loaded tree: a parsed file, a network fetch,
/// or simply a tree already in memory.
pub trait TreeSource {
    fn load_tree(&self) -> Result<Tree>;
}

impl TreeSource for Tree {
    fn load_tree(&self) -> Result<Tree> {
        Ok(self.clone())
    }
}

impl<S: TreeSource + ?Sized> TreeSource for &S {
    fn load_tree(&self) -> Result<Tree> {
        (**self).load_tree()
    }
}

/// The ordered, non-empty set of trees whose votes make up one label per pixel.
#[derive(Debug, Clone)]
pub struct Ensemble {
    trees: Vec<Tree>,
}

impl Ensemble {
    /// Loads and validates every source in order. Fails on an empty list, on
    /// the first source that fails to load, and on the first malformed tree.
    pub fn from_sources<I, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: TreeSource,
    {
        let mut trees = Vec::new();
        for (index, source) in sources.into_iter().enumerate() {
            let tree = source.load_tree().map_err(|err| match err {
                DetectorError::MalformedTree { reason, .. } => {
                    DetectorError::MalformedTree { index, reason }
                }
                DetectorError::Source { message, .. } => DetectorError::Source { index, message },
                other => DetectorError::Source {
                    index,
                    message: other.to_string(),
                },
            })?;
            tree.validate()
                .map_err(|reason| DetectorError::MalformedTree { index, reason })?;
            trees.push(tree);
        }
        if trees.is_empty() {
            return Err(DetectorError::EmptyEnsemble);
        }
        Ok(Self { trees })
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    impl TreeSource for FailingSource {
        fn load_tree(&self) -> Result<Tree> {
            Err(DetectorError::Source {
                index: 0,
                message: "truncated file".into(),
            })
        }
    }

    #[test]
    fn descend_follows_thresholds() {
        // root splits on feature > 0, then both children split on feature > 10.
        let nodes = vec![Node::new(0, 0, 0, 0, 0), Node::new(0, 0, 0, 0, 10), Node::new(0, 0, 0, 0, 10)];
        let tree = Tree::new(2, nodes, vec![1, 2, 3, 4]).unwrap();

        assert_eq!(tree.descend(|_| -5), 1);
        assert_eq!(tree.descend(|n| if n.threshold == 0 { 1 } else { 20 }), 4);
        assert_eq!(tree.descend(|n| if n.threshold == 0 { 1 } else { 5 }), 3);
        assert_eq!(tree.descend(|n| if n.threshold == 0 { 0 } else { 11 }), 2);
    }

    #[test]
    fn rejects_wrong_layout() {
        assert!(Tree::new(1, vec![], vec![0, 1]).is_err());
        assert!(Tree::new(1, vec![Node::default()], vec![0]).is_err());
        assert!(Tree::new(0, vec![], vec![NUM_PARTS as Label]).is_err());
    }

    #[test]
    fn empty_source_list_is_an_error() {
        let sources: Vec<Tree> = Vec::new();
        assert!(matches!(
            Ensemble::from_sources(sources),
            Err(DetectorError::EmptyEnsemble)
        ));
    }

    #[test]
    fn source_failures_carry_their_position() {
        let good = Tree::constant(3);
        let sources: Vec<&dyn TreeSource> = vec![&good, &FailingSource];
        match Ensemble::from_sources(sources) {
            Err(DetectorError::Source { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn ensemble_keeps_source_order() {
        let ensemble = Ensemble::from_sources(vec![Tree::constant(1), Tree::constant(2)]).unwrap();
        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.trees()[0].leaves(), &[1]);
        assert_eq!(ensemble.trees()[1].leaves(), &[2]);
    }
}
