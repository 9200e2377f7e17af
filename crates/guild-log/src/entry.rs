use chrono::{DateTime, Utc};
use guild_types::{Address, SkillId};
use serde::{Deserialize, Serialize};

/// One recorded reputation delta, expandable into multiple tree writes
/// via skill ancestry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    pub user: Address,
    pub amount: i128,
    pub skill_id: SkillId,
    pub organization: Address,
    /// Number of elementary tree writes this entry expands into.
    pub n_updates: u64,
    /// Running prefix sum of `n_updates` over all prior entries, i.e. the
    /// offset of this entry's writes in the flattened write sequence.
    pub n_previous_updates: u64,
    pub appended_at: DateTime<Utc>,
}

impl UpdateLogEntry {
    /// A loss also debits every ancestor skill's aggregate, so it expands
    /// into twice as many writes as a gain.
    pub fn n_updates_for(amount: i128, ancestor_count: usize) -> u64 {
        let per_skill = if amount >= 0 { 2 } else { 4 };
        per_skill * (1 + ancestor_count as u64)
    }

    /// Stable 6-tuple field order for external verifiers.
    pub fn as_tuple(&self) -> (Address, i128, SkillId, Address, u64, u64) {
        (
            self.user,
            self.amount,
            self.skill_id,
            self.organization,
            self.n_updates,
            self.n_previous_updates,
        )
    }
}
