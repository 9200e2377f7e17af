use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("Mining has not been initialised")]
    NotInitialised,

    #[error("Mining is already initialised")]
    AlreadyInitialised,

    #[error("Cycle {cycle_id} is still unresolved; a new cycle cannot start")]
    CycleUnresolved { cycle_id: u64 },

    #[error("No inactive cycle exists")]
    NoInactiveCycle,
}

pub type Result<T> = std::result::Result<T, CycleError>;
