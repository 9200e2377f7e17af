use crate::error::{Result, TreeError};
use crate::policy::WriteOp;
use guild_types::{ReputationKey, StateRoot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse mapping from reputation key to a non-negative value, with a
/// deterministic Merkle commitment over its contents.
///
/// Leaves are ordered by key; the leaf hash binds the key encoding and the
/// value, so any two honest builders over the same write sequence commit
/// to byte-identical roots.
#[derive(Debug, Clone, Default)]
pub struct ReputationTree {
    leaves: BTreeMap<ReputationKey, u128>,
}

impl ReputationTree {
    pub fn new() -> Self {
        Self {
            leaves: BTreeMap::new(),
        }
    }

    /// Apply one write: `new = clamp(existing + amount, 0, MAX)`.
    /// Underflow clamps to zero; overflow past the representable maximum
    /// is a fault, never a silent wrap. Returns the new value.
    pub fn apply(&mut self, write: &WriteOp) -> Result<u128> {
        let current = self.leaves.get(&write.key).copied().unwrap_or(0);
        let next = if write.amount >= 0 {
            current
                .checked_add(write.amount as u128)
                .ok_or_else(|| {
                    TreeError::ArithmeticFault(format!(
                        "reputation value overflow applying {} to {}",
                        write.amount, current
                    ))
                })?
        } else {
            current.saturating_sub(write.amount.unsigned_abs())
        };
        self.leaves.insert(write.key, next);
        Ok(next)
    }

    /// Insert a raw key/value, bypassing delta arithmetic. Used by
    /// fault-injecting policies; an honest replay never calls this.
    pub fn insert_raw(&mut self, key: ReputationKey, value: u128) {
        self.leaves.insert(key, value);
    }

    pub fn get(&self, key: &ReputationKey) -> Option<u128> {
        self.leaves.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn leaf_hash(key: &ReputationKey, value: u128) -> [u8; 32] {
        let mut data = Vec::with_capacity(72 + 16);
        data.extend_from_slice(&key.to_bytes());
        data.extend_from_slice(&value.to_le_bytes());
        *blake3::hash(&data).as_bytes()
    }

    fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut data = [0u8; 64];
        data[..32].copy_from_slice(left);
        data[32..].copy_from_slice(right);
        *blake3::hash(&data).as_bytes()
    }

    /// All levels of the Merkle tree, leaves first. An odd trailing node
    /// is promoted unchanged to the next level.
    fn levels(&self) -> Vec<Vec<[u8; 32]>> {
        let mut levels = vec![self
            .leaves
            .iter()
            .map(|(k, v)| Self::leaf_hash(k, *v))
            .collect::<Vec<_>>()];

        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let prev = levels.last().unwrap();
            let mut next = Vec::with_capacity((prev.len() + 1) / 2);
            for pair in prev.chunks(2) {
                match pair {
                    [left, right] => next.push(Self::hash_pair(left, right)),
                    [odd] => next.push(*odd),
                    _ => unreachable!(),
                }
            }
            levels.push(next);
        }
        levels
    }

    /// Commitment over the full mapping. The empty tree commits to the
    /// all-zero root.
    pub fn root(&self) -> StateRoot {
        if self.leaves.is_empty() {
            return StateRoot::ZERO;
        }
        let levels = self.levels();
        StateRoot::from_bytes(levels.last().unwrap()[0])
    }

    /// Inclusion proof for `key`, or `None` if the key is absent.
    pub fn prove(&self, key: &ReputationKey) -> Option<MerkleProof> {
        let mut index = self.leaves.keys().position(|k| k == key)?;
        let levels = self.levels();

        let mut siblings = Vec::new();
        for level in &levels[..levels.len() - 1] {
            let sibling_index = index ^ 1;
            if let Some(hash) = level.get(sibling_index) {
                siblings.push(ProofNode {
                    hash: *hash,
                    is_left: sibling_index < index,
                });
            }
            index /= 2;
        }
        Some(MerkleProof { siblings })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub hash: [u8; 32],
    pub is_left: bool,
}

/// Merkle path from a leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub siblings: Vec<ProofNode>,
}

impl MerkleProof {
    /// Check that `(key, value)` is included under `root`.
    pub fn verify(&self, root: &StateRoot, key: &ReputationKey, value: u128) -> bool {
        let mut acc = ReputationTree::leaf_hash(key, value);
        for node in &self.siblings {
            acc = if node.is_left {
                ReputationTree::hash_pair(&node.hash, &acc)
            } else {
                ReputationTree::hash_pair(&acc, &node.hash)
            };
        }
        StateRoot::from_bytes(acc) == *root
    }
}
