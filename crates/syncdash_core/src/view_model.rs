use crate::{Instance, StopReason, TaskStatus, TrackerPhase};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DashboardView {
    pub tracker: TrackerView,
    pub instances: Vec<Instance>,
    pub active_instance: Option<Instance>,
    pub instances_loaded: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerView {
    pub task_id: Option<String>,
    pub phase: TrackerPhase,
    pub status: Option<TaskStatus>,
    pub last_error: Option<String>,
    pub stop_reason: Option<StopReason>,
    pub can_cancel: bool,
}
