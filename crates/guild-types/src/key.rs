use crate::Address;
use serde::{Deserialize, Serialize};

pub type SkillId = u64;

/// Designated global organization whose totals mirror all logged activity.
pub const MINING_ORGANIZATION: Address = Address::from_bytes([0xff; 32]);

/// Skill under which mining-activity totals accumulate. Seeded as a child
/// of the root skill by the hierarchy at construction.
pub const MINING_SKILL: SkillId = 1;

/// Addressable key of one reputation value: organization-scoped,
/// per-skill, per-user. The zero user denotes the organization-wide total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReputationKey {
    pub organization: Address,
    pub skill_id: SkillId,
    pub user: Address,
}

impl ReputationKey {
    pub fn new(organization: Address, skill_id: SkillId, user: Address) -> Self {
        Self {
            organization,
            skill_id,
            user,
        }
    }

    /// Organization-wide total for a skill.
    pub fn organization_total(organization: Address, skill_id: SkillId) -> Self {
        Self::new(organization, skill_id, Address::ZERO)
    }

    /// The single global mining total.
    pub fn mining_total() -> Self {
        Self::new(MINING_ORGANIZATION, MINING_SKILL, Address::ZERO)
    }

    /// Unique byte encoding: organization || skill (LE) || user.
    /// Leaf hashes and proof verification both derive from this.
    pub fn to_bytes(&self) -> [u8; 72] {
        let mut out = [0u8; 72];
        out[..32].copy_from_slice(self.organization.as_bytes());
        out[32..40].copy_from_slice(&self.skill_id.to_le_bytes());
        out[40..].copy_from_slice(self.user.as_bytes());
        out
    }
}
