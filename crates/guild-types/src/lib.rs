pub mod address;
pub mod key;
pub mod root;

pub use address::Address;
pub use key::{ReputationKey, SkillId, MINING_ORGANIZATION, MINING_SKILL};
pub use root::StateRoot;
