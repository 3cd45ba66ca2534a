//! Syncdash core: pure state machine for task tracking and instance selection.
mod effect;
mod instance;
mod msg;
mod state;
mod stats;
mod task;
mod update;
mod view_model;

pub use effect::{Effect, Notification, NotificationLevel};
pub use instance::{Instance, InstanceCache, InstanceId, ACTIVE_INSTANCE_KEY};
pub use msg::Msg;
pub use state::AppState;
pub use stats::{
    ActiveTask, ActiveTasks, ProductSyncStats, QueueCounts, QueueStats, StatusBreakdown,
    SummaryWindow, TaskSummary,
};
pub use task::{
    Epoch, PollOutcome, PollTicket, StopReason, TaskProgress, TaskState, TaskStatus,
    TaskSubmission, TaskTracker, TrackerPhase,
};
pub use update::update;
pub use view_model::{DashboardView, TrackerView};
