pub mod coordinator;
pub mod error;

pub use coordinator::{CycleCoordinator, CycleRecord};
pub use error::{CycleError, Result};
