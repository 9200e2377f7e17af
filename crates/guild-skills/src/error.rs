use guild_types::SkillId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkillError {
    #[error("Unknown skill: {0}")]
    UnknownSkill(SkillId),

    #[error("Unknown parent skill: {0}")]
    UnknownParent(SkillId),
}

pub type Result<T> = std::result::Result<T, SkillError>;
