//! Merkle summaries of a block's event sequence

use crate::hash::HashFn;

/// Node of the ephemeral tree built while summarizing event hashes.
///
/// A leaf carries an event hash (or a synthesized duplicate of an odd
/// sibling out); an internal node hashes the concatenation of its two
/// children's hashes. The tree only lives inside [`merkle_root`] and
/// [`MerkleNode::build`] callers; nothing retains it past the root
/// computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleNode {
    hash: String,
    left: Option<Box<MerkleNode>>,
    right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    fn leaf(hash: String) -> Self {
        MerkleNode {
            hash,
            left: None,
            right: None,
        }
    }

    fn parent(hasher: &HashFn, left: MerkleNode, right: MerkleNode) -> Self {
        let mut bytes = left.hash.clone().into_bytes();
        bytes.extend_from_slice(right.hash.as_bytes());

        MerkleNode {
            hash: hasher.digest(&bytes),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    /// Build the full tree over `hashes`, pairwise level by level. A node
    /// left without a sibling is paired with a duplicate leaf carrying its
    /// own hash, so every internal node has exactly two children. `None`
    /// when there is nothing to summarize.
    pub fn build(hashes: &[String], hasher: &HashFn) -> Option<MerkleNode> {
        if hashes.is_empty() {
            return None;
        }

        let mut level: Vec<MerkleNode> =
            hashes.iter().cloned().map(MerkleNode::leaf).collect();
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            let mut nodes = level.into_iter();
            while let Some(left) = nodes.next() {
                let right = nodes
                    .next()
                    .unwrap_or_else(|| MerkleNode::leaf(left.hash.clone()));
                next.push(MerkleNode::parent(hasher, left, right));
            }
            level = next;
        }

        level.pop()
    }

    #[inline]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn left(&self) -> Option<&MerkleNode> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&MerkleNode> {
        self.right.as_deref()
    }

    /// A node is a leaf exactly when both children are absent.
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Merkle root of an ordered event-hash sequence: the zero digest for an
/// empty sequence, the hash itself for a single event, pairwise reduction
/// with odd-sibling duplication otherwise. Pure: identical input always
/// yields an identical root.
pub fn merkle_root(hashes: &[String], hasher: &HashFn) -> String {
    if let [single] = hashes {
        return single.clone();
    }

    MerkleNode::build(hashes, hasher)
        .map_or_else(|| hasher.zero_digest(), |root| root.hash)
}
