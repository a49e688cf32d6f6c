mod cancellation;
mod core;
mod stats;
mod types;

pub use cancellation::CancellationToken;
pub use core::TaskSupervisor;
pub use stats::{SupervisorStats, TaskMetrics};
pub use types::*;
