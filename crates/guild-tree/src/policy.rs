use crate::error::Result;
use async_trait::async_trait;
use guild_log::UpdateLogEntry;
use guild_skills::SkillHierarchy;
use guild_types::{Address, ReputationKey};
use serde::{Deserialize, Serialize};

/// One elementary tree write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOp {
    pub key: ReputationKey,
    pub amount: i128,
}

/// How a miner turns a log entry into tree writes. The honest rule is
/// fixed by the protocol; fault-injecting implementations exist for
/// adversarial tests and are selected at miner construction.
#[async_trait]
pub trait UpdatePolicy: Send + Sync {
    /// Expand one log entry into its ordered write set.
    async fn expand(
        &self,
        entry: &UpdateLogEntry,
        skills: &SkillHierarchy,
    ) -> Result<Vec<WriteOp>>;

    /// Extra raw tree insertion after the write at `write_index` is
    /// applied. `None` for honest miners.
    fn inject_after(&self, _write_index: u64) -> Option<(ReputationKey, u128)> {
        None
    }
}

/// The protocol rule. For every affected skill (leaf plus each ancestor):
/// a user write in the originating organization and a write to the global
/// mining total. A loss additionally debits the organization-wide
/// aggregate of each affected skill, with a matching mining-total write,
/// doubling the write count.
pub struct HonestPolicy;

#[async_trait]
impl UpdatePolicy for HonestPolicy {
    async fn expand(
        &self,
        entry: &UpdateLogEntry,
        skills: &SkillHierarchy,
    ) -> Result<Vec<WriteOp>> {
        let mut affected = vec![entry.skill_id];
        affected.extend(skills.ancestors_of(entry.skill_id).await?);

        let mut writes = Vec::with_capacity(entry.n_updates as usize);
        for &skill in &affected {
            writes.push(WriteOp {
                key: ReputationKey::new(entry.organization, skill, entry.user),
                amount: entry.amount,
            });
            writes.push(WriteOp {
                key: ReputationKey::mining_total(),
                amount: entry.amount,
            });
            if entry.amount < 0 {
                writes.push(WriteOp {
                    key: ReputationKey::organization_total(entry.organization, skill),
                    amount: entry.amount,
                });
                writes.push(WriteOp {
                    key: ReputationKey::mining_total(),
                    amount: entry.amount,
                });
            }
        }
        Ok(writes)
    }
}

/// Expands honestly but also inserts a fabricated key/value pair into the
/// tree right after a chosen write index, the classic synthetic-leaf
/// fraud a dispute must catch.
pub struct FabricatePolicy {
    pub falsify_at: u64,
    pub value: u128,
}

impl FabricatePolicy {
    pub fn new(falsify_at: u64) -> Self {
        Self {
            falsify_at,
            value: 0xdeadbeef,
        }
    }

    pub fn fabricated_key() -> ReputationKey {
        let mut pattern = [0u8; 32];
        for (i, b) in pattern.iter_mut().enumerate() {
            *b = [0xde, 0xad, 0xbe, 0xef][i % 4];
        }
        ReputationKey::new(
            Address::from_bytes(pattern),
            0xdeadbeef,
            Address::from_bytes(pattern),
        )
    }
}

#[async_trait]
impl UpdatePolicy for FabricatePolicy {
    async fn expand(
        &self,
        entry: &UpdateLogEntry,
        skills: &SkillHierarchy,
    ) -> Result<Vec<WriteOp>> {
        HonestPolicy.expand(entry, skills).await
    }

    fn inject_after(&self, write_index: u64) -> Option<(ReputationKey, u128)> {
        (write_index == self.falsify_at).then(|| (Self::fabricated_key(), self.value))
    }
}

/// Expands honestly except that one flattened write (addressed by the
/// entry's prefix sum) has its amount skewed.
pub struct SkewPolicy {
    pub falsify_at: u64,
    pub skew: i128,
}

#[async_trait]
impl UpdatePolicy for SkewPolicy {
    async fn expand(
        &self,
        entry: &UpdateLogEntry,
        skills: &SkillHierarchy,
    ) -> Result<Vec<WriteOp>> {
        let mut writes = HonestPolicy.expand(entry, skills).await?;
        let start = entry.n_previous_updates;
        if self.falsify_at >= start && self.falsify_at < start + entry.n_updates {
            let local = (self.falsify_at - start) as usize;
            if let Some(w) = writes.get_mut(local) {
                w.amount += self.skew;
            }
        }
        Ok(writes)
    }
}
