use guild_types::Address;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DisputeError {
    #[error("Dispute is not in the {expected} phase")]
    WrongPhase { expected: &'static str },

    #[error("Miner {0} is not a party to this dispute")]
    UnknownMiner(Address),

    #[error("Duplicate submission from {0}")]
    DuplicateSubmission(Address),

    #[error("Wrong bisection round: expected {expected}, got {got}")]
    WrongRound { expected: u32, got: u32 },

    #[error("Log {0} is still active; only a closed log can be disputed")]
    LogStillActive(u64),

    #[error("Tree error: {0}")]
    Tree(#[from] guild_tree::TreeError),
}

pub type Result<T> = std::result::Result<T, DisputeError>;
