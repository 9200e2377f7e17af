use guild_types::{Address, StateRoot};
use serde::{Deserialize, Serialize};

/// Dispute protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeConfig {
    /// Epochs a party has to answer each bisection round (and the final
    /// reveal). Missing the deadline forfeits the submission.
    pub round_deadline_epochs: u64,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            round_deadline_epochs: 10,
        }
    }
}

/// Where the dispute currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputePhase {
    /// Fewer than two roots submitted.
    AwaitingSubmissions,
    /// Binary search over the flattened write range. Invariant: both
    /// parties agree on the commitment after `lo` writes and disagree
    /// after `hi`.
    Bisecting { lo: u64, hi: u64, round: u32 },
    /// Window narrowed to the single write at `disputed`; awaiting
    /// reveals.
    Adjudicating { disputed: u64 },
    Resolved(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Both submissions carried the same root; nothing to dispute.
    Agreement(StateRoot),
    /// One party's claims survived adjudication (or the other timed out).
    Winner(Address),
    /// Both submissions were adjudicated faulty; the cycle may require
    /// re-mining.
    BothFaulty,
}

/// A competing root submission for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub miner: Address,
    pub root: StateRoot,
}

/// A party's reveal of the single disputed write: which log entry, and
/// which write within that entry's expansion, it claims is being applied.
/// The resolver reads the entry itself from the immutable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputedWriteReveal {
    pub entry_index: u64,
    pub write_in_entry: u64,
}
