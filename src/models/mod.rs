pub mod session;
pub mod stats;
pub mod task;

pub use session::{SessionKind, SessionRecord};
pub use stats::{DailyStats, WeeklyStats};
pub use task::Task;
