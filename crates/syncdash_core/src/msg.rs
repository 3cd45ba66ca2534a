use crate::{Epoch, Instance, InstanceId, PollTicket, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Caller asked to follow a task (usually right after submitting it).
    StartTracking { task_id: String },
    /// Caller closed the tracker.
    StopTracking,
    /// Caller asked the backend to cancel a task.
    CancelRequested { task_id: String },
    /// Cancel request finished, successfully or not.
    CancelFinished {
        task_id: String,
        epoch: Option<Epoch>,
        result: Result<(), String>,
    },
    /// One status poll came back.
    PollCompleted {
        ticket: PollTicket,
        result: Result<TaskStatus, String>,
    },
    /// A view that depends on the instance list was mounted.
    InstancesRequested,
    InstancesLoaded(Result<Vec<Instance>, String>),
    ActiveInstanceRequested,
    /// `Ok(None)` means the backend has no active instance.
    ActiveInstanceLoaded(Result<Option<Instance>, String>),
    /// User picked an instance.
    ActivateRequested { id: InstanceId },
    ActivateCompleted {
        id: InstanceId,
        result: Result<Instance, String>,
    },
    /// Another context changed the flat shared key.
    ForeignActiveChanged { value: Option<String> },
    /// Seed the active selection from persisted state.
    RestoreActiveInstance(Instance),
    LoggedOut,
    /// Fallback for placeholder wiring.
    NoOp,
}
