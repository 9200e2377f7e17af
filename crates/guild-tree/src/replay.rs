use crate::error::{Result, TreeError};
use crate::policy::{UpdatePolicy, WriteOp};
use crate::tree::ReputationTree;
use guild_log::ReputationUpdateLog;
use guild_skills::SkillHierarchy;
use guild_types::StateRoot;
use std::collections::HashMap;
use tracing::debug;

/// Resumable cursor over the flattened write sequence of a closed log.
///
/// Replay is a pure function of the log contents and index order, so it
/// can be paused at any write index and resumed later without re-deriving
/// prior state. Write indices are local to the log: index 0 is the first
/// write of the log's first entry, regardless of the prefix-sum
/// carry-over the log was opened with.
pub struct StateReplay {
    writes: Vec<WriteOp>,
    /// `(entry_index, write_in_entry)` for every flattened write.
    origins: Vec<(u64, u64)>,
    /// Fault injections requested by the policy, by write index.
    injections: HashMap<u64, (guild_types::ReputationKey, u128)>,
    tree: ReputationTree,
    position: u64,
}

impl StateReplay {
    /// Expand every entry of `log` in index order under `policy`.
    pub async fn new(
        log: &ReputationUpdateLog,
        skills: &SkillHierarchy,
        policy: &dyn UpdatePolicy,
    ) -> Result<Self> {
        let entries = log.entries().await;

        let mut writes = Vec::new();
        let mut origins = Vec::new();
        for (entry_index, entry) in entries.iter().enumerate() {
            let expanded = policy.expand(entry, skills).await?;
            for (write_in_entry, write) in expanded.into_iter().enumerate() {
                writes.push(write);
                origins.push((entry_index as u64, write_in_entry as u64));
            }
        }

        let injections = (0..writes.len() as u64)
            .filter_map(|i| policy.inject_after(i).map(|kv| (i, kv)))
            .collect();

        debug!(
            log_id = log.log_id(),
            entries = entries.len(),
            total_writes = writes.len(),
            "Replay cursor prepared"
        );

        Ok(Self {
            writes,
            origins,
            injections,
            tree: ReputationTree::new(),
            position: 0,
        })
    }

    pub fn total_writes(&self) -> u64 {
        self.writes.len() as u64
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Apply the next write. Returns the applied write, or `None` when the
    /// sequence is exhausted.
    pub fn step(&mut self) -> Result<Option<WriteOp>> {
        let Some(write) = self.writes.get(self.position as usize).copied() else {
            return Ok(None);
        };
        self.tree.apply(&write)?;
        if let Some((key, value)) = self.injections.get(&self.position).copied() {
            self.tree.insert_raw(key, value);
        }
        self.position += 1;
        Ok(Some(write))
    }

    /// Advance to `index` applied writes. The cursor only moves forward;
    /// restart from a fresh replay to revisit an earlier checkpoint.
    pub fn run_to(&mut self, index: u64) -> Result<()> {
        if index > self.total_writes() {
            return Err(TreeError::OutOfRange {
                index,
                total: self.total_writes(),
            });
        }
        if index < self.position {
            return Err(TreeError::CannotRewind {
                position: self.position,
                target: index,
            });
        }
        while self.position < index {
            self.step()?;
        }
        Ok(())
    }

    /// Commitment over the partial state after `position()` writes.
    pub fn root(&self) -> StateRoot {
        self.tree.root()
    }

    pub fn tree(&self) -> &ReputationTree {
        &self.tree
    }

    /// Which `(entry_index, write_in_entry)` produced the write at `index`.
    pub fn origin_of(&self, index: u64) -> Option<(u64, u64)> {
        self.origins.get(index as usize).copied()
    }
}
