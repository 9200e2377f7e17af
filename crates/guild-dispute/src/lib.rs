pub mod error;
pub mod resolver;
pub mod types;

pub use error::{DisputeError, Result};
pub use resolver::DisputeResolver;
pub use types::{DisputeConfig, DisputePhase, DisputedWriteReveal, Outcome, Submission};
