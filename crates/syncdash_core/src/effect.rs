use crate::{Epoch, InstanceId, PollTicket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Run the poll loop for this ticket until its epoch goes stale.
    StartPolling { ticket: PollTicket },
    HaltPolling,
    /// `epoch` is set when the task being cancelled is the tracked one.
    CancelTask {
        task_id: String,
        epoch: Option<Epoch>,
    },
    FetchInstances,
    FetchActiveInstance,
    ActivateInstance { id: InstanceId },
    /// Write (or remove, for `None`) the flat shared key.
    MirrorActiveInstance { id: Option<InstanceId> },
    /// Same-process signal for co-mounted consumers.
    BroadcastInstanceChanged { id: Option<InstanceId> },
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}
