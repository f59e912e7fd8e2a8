pub mod checker;
/// Monitoring engine module - checks game servers and detects status changes
///
/// This module is responsible for:
/// - Querying servers with a bounded retry policy
/// - Rendering status messages and detecting changes
/// - Running the periodic polling cycle
pub mod query;
pub mod scheduler;
pub mod types;

pub use checker::{RetryPolicy, StatusChecker};
pub use query::{A2sQuery, QueryError, StatusQuery};
pub use scheduler::{CycleReport, PollingScheduler, SchedulerState};
pub use types::{CheckOutcome, EndpointKey, EndpointStatus, StatusInfo};
