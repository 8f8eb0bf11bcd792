//! Merkle audit over version histories
//!
//! Every lineage folds into a [`HistoryRoot`]: a Merkle root over its
//! version chain. A [`LineageProof`] shows one version's membership under a
//! root without access to the store. Leaves are derived from version
//! summaries, so an auditor holding only history listings can rebuild and
//! check the tree.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use rs_merkle::{Hasher, MerkleTree as RsMerkleTree};
use sha2::{Digest, Sha256};

use crate::record::VersionSummary;

/// SHA-256 hasher adapter for rs_merkle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    type Hash = [u8; 32];

    #[inline]
    fn hash(data: &[u8]) -> Self::Hash {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

/// Leaf bytes for one version of a lineage.
///
/// Binds the version number, the payload identity, and the tombstone flag;
/// payload bytes themselves are already committed to by the identity.
#[must_use]
pub fn lineage_leaf(summary: &VersionSummary) -> [u8; 32] {
    let mut buf = [0u8; 17];
    buf[..8].copy_from_slice(&summary.version.get().to_le_bytes());
    buf[8..16].copy_from_slice(&summary.identity.to_be_bytes());
    buf[16] = u8::from(summary.tombstone);
    Sha256Hasher::hash(&buf)
}

/// Merkle root of a lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryRoot([u8; 32]);

impl HistoryRoot {
    /// Root of the empty lineage
    pub const EMPTY: Self = Self([0; 32]);

    /// The raw root bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the empty-lineage root
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        let mut i = 0;
        while i < 32 {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }
}

impl Display for HistoryRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for HistoryRoot {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

/// Merkle tree over one key's version chain
pub struct LineageTree {
    inner: RsMerkleTree<Sha256Hasher>,
    leaf_count: usize,
}

impl std::fmt::Debug for LineageTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineageTree")
            .field("leaf_count", &self.leaf_count)
            .field("root", &self.root())
            .finish()
    }
}

impl LineageTree {
    /// Build a tree from a history listing in version order
    #[must_use]
    pub fn from_history(history: &[VersionSummary]) -> Self {
        let leaves: Vec<[u8; 32]> = history.iter().map(lineage_leaf).collect();
        Self {
            inner: RsMerkleTree::from_leaves(&leaves),
            leaf_count: leaves.len(),
        }
    }

    /// The root, [`HistoryRoot::EMPTY`] for an empty lineage
    #[must_use]
    pub fn root(&self) -> HistoryRoot {
        self.inner.root().map_or(HistoryRoot::EMPTY, HistoryRoot)
    }

    /// Number of versions covered
    #[inline]
    #[must_use]
    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Whether the tree covers no versions
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Membership proof for the version at `index`, if in range
    #[must_use]
    pub fn prove(&self, index: usize) -> Option<LineageProof> {
        if index >= self.leaf_count {
            return None;
        }
        let leaf = self.inner.leaves().and_then(|l| l.get(index).copied())?;
        Some(LineageProof {
            inner: self.inner.proof(&[index]),
            leaf,
            index,
            total: self.leaf_count,
        })
    }
}

/// Self-contained membership proof for one version
///
/// Carries the leaf, its index, and the tree size; verification needs only
/// the expected root.
pub struct LineageProof {
    inner: rs_merkle::MerkleProof<Sha256Hasher>,
    leaf: [u8; 32],
    index: usize,
    total: usize,
}

impl std::fmt::Debug for LineageProof {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineageProof")
            .field("index", &self.index)
            .field("total", &self.total)
            .finish()
    }
}

impl LineageProof {
    /// Index of the proven version within the lineage
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Versions covered by the tree this proof came from
    #[inline]
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Check the proof against an expected root
    #[must_use]
    pub fn verify(&self, root: &HistoryRoot) -> bool {
        self.inner
            .verify(*root.as_bytes(), &[self.index], &[self.leaf], self.total)
    }

    /// Check that this proof commits to the given version summary
    #[must_use]
    pub fn matches(&self, summary: &VersionSummary) -> bool {
        lineage_leaf(summary) == self.leaf
    }
}
