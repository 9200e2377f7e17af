pub mod error;
pub mod miner;
pub mod policy;
pub mod replay;
pub mod tree;

pub use error::{Result, TreeError};
pub use miner::Miner;
pub use policy::{FabricatePolicy, HonestPolicy, SkewPolicy, UpdatePolicy, WriteOp};
pub use replay::StateReplay;
pub use tree::{MerkleProof, ProofNode, ReputationTree};
