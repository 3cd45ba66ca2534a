use crate::view_model::{DashboardView, TrackerView};
use crate::{InstanceCache, TaskTracker};

/// Explicit per-context state container; nothing here is process-global.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    tracker: TaskTracker,
    instances: InstanceCache,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn instances(&self) -> &InstanceCache {
        &self.instances
    }

    pub fn view(&self) -> DashboardView {
        let tracker = &self.tracker;
        DashboardView {
            tracker: TrackerView {
                task_id: tracker.task_id().map(ToOwned::to_owned),
                phase: tracker.phase(),
                status: tracker.status().cloned(),
                last_error: tracker.last_error().map(ToOwned::to_owned),
                stop_reason: tracker.stop_reason(),
                can_cancel: tracker.is_polling()
                    && tracker
                        .status()
                        .map_or(true, |status| status.state.is_cancellable()),
            },
            instances: self.instances.instances().to_vec(),
            active_instance: self.instances.active().cloned(),
            instances_loaded: self.instances.is_loaded(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and resets it.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut TaskTracker {
        &mut self.tracker
    }

    pub(crate) fn instances_mut(&mut self) -> &mut InstanceCache {
        &mut self.instances
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
