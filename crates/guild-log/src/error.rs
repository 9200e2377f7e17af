use guild_types::Address;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Caller is not a recognized organization: {0}")]
    Unauthorized(Address),

    #[error("Log index out of range: {index} >= {len}")]
    OutOfRange { index: u64, len: u64 },

    #[error("Log {0} is closed")]
    LogClosed(u64),

    #[error("Arithmetic fault: {0}")]
    ArithmeticFault(String),

    #[error("Skill error: {0}")]
    Skill(#[from] guild_skills::SkillError),
}

pub type Result<T> = std::result::Result<T, LogError>;
