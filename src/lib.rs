pub mod aggregate;
pub mod extract;
pub mod fetch;
pub mod insights;
pub mod merge;
pub mod recruit_fetch;
pub mod state;
pub mod team_fetch;
pub mod util;

pub use aggregate::{AggregatorConfig, ProgramAggregator, ProgramDataParams};
pub use state::AggregatedProgramRecord;
