use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Arithmetic fault: {0}")]
    ArithmeticFault(String),

    #[error("Write index out of range: {index} >= {total}")]
    OutOfRange { index: u64, total: u64 },

    #[error("Replay cursor cannot rewind from {position} to {target}")]
    CannotRewind { position: u64, target: u64 },

    #[error("Skill error: {0}")]
    Skill(#[from] guild_skills::SkillError),

    #[error("Log error: {0}")]
    Log(#[from] guild_log::LogError),
}

pub type Result<T> = std::result::Result<T, TreeError>;
