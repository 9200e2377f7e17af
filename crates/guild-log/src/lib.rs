pub mod entry;
pub mod error;
pub mod log;
pub mod math;
pub mod registry;

pub use entry::UpdateLogEntry;
pub use error::{LogError, Result};
pub use log::ReputationUpdateLog;
pub use math::{combine_payouts, scale_payout};
pub use registry::OrganizationRegistry;
