use std::fmt;

/// Monotonic tracking generation. Every start and stop bumps it.
pub type Epoch = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Started,
    Progress,
    Retry,
    Success,
    Failure,
    Revoked,
}

impl TaskState {
    pub const ALL: [TaskState; 7] = [
        TaskState::Pending,
        TaskState::Started,
        TaskState::Progress,
        TaskState::Retry,
        TaskState::Success,
        TaskState::Failure,
        TaskState::Revoked,
    ];

    /// Parses the backend's upper-case state name. Unknown names yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Progress => "PROGRESS",
            TaskState::Retry => "RETRY",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }

    /// States in which the backend still accepts a cancel request.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            TaskState::Pending | TaskState::Started | TaskState::Progress
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskProgress {
    pub current: u64,
    pub total: u64,
    pub message: Option<String>,
    /// Reported percentage, clamped to 0..=100.
    pub percentage: Option<u8>,
}

impl TaskProgress {
    /// Reported percentage, or one derived from `current / total`.
    pub fn percent(&self) -> u8 {
        if let Some(percentage) = self.percentage {
            return percentage.min(100);
        }
        if self.total == 0 {
            return 0;
        }
        let ratio = u128::from(self.current.min(self.total)) * 100 / u128::from(self.total);
        ratio as u8
    }
}

/// One snapshot of a remote task, as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub task_id: String,
    pub task_name: Option<String>,
    pub state: TaskState,
    pub progress: Option<TaskProgress>,
    /// Result payload rendered as JSON text; only set on SUCCESS.
    pub result: Option<String>,
    /// Only set on FAILURE.
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: None,
            state,
            progress: None,
            result: None,
            error: None,
            duration_ms: None,
        }
    }

    /// Last segment of the dotted job name, e.g. `sync_products` for
    /// `app.tasks.sync_products`.
    pub fn display_name(&self) -> &str {
        self.task_name
            .as_deref()
            .and_then(|name| name.rsplit('.').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("Task")
    }

    pub fn short_id(&self) -> String {
        let prefix: String = self.task_id.chars().take(8).collect();
        if prefix.len() < self.task_id.len() {
            format!("{prefix}...")
        } else {
            prefix
        }
    }
}

/// Acknowledgement returned when a sync job is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSubmission {
    pub task_id: String,
    pub status: String,
    pub instance_id: Option<u64>,
    pub created_at: Option<String>,
    pub check_url: Option<String>,
}

/// Identifies one scheduled poll. A response is applied only while its epoch
/// is still the tracker's current epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub epoch: Epoch,
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerPhase {
    #[default]
    Untracked,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Cancelled,
    Terminal(TaskState),
    LoggedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The ticket belongs to an older epoch; nothing changed.
    Stale,
    Updated,
    Terminal(TaskState),
    /// The poll failed; the previous snapshot is kept.
    Failed,
}

/// Tracks at most one remote task at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskTracker {
    epoch: Epoch,
    task_id: Option<String>,
    phase: TrackerPhase,
    status: Option<TaskStatus>,
    last_error: Option<String>,
    stop_reason: Option<StopReason>,
}

impl TaskTracker {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn status(&self) -> Option<&TaskStatus> {
        self.status.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn is_polling(&self) -> bool {
        self.phase == TrackerPhase::Polling
    }

    pub fn is_current(&self, ticket: &PollTicket) -> bool {
        self.is_polling() && ticket.epoch == self.epoch
    }

    pub fn current_ticket(&self) -> Option<PollTicket> {
        if !self.is_polling() {
            return None;
        }
        self.task_id.as_ref().map(|task_id| PollTicket {
            epoch: self.epoch,
            task_id: task_id.clone(),
        })
    }

    /// Begins tracking `task_id`. Blank ids are ignored.
    pub(crate) fn start(&mut self, task_id: &str) -> Option<PollTicket> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return None;
        }
        self.epoch += 1;
        self.task_id = Some(task_id.to_string());
        self.phase = TrackerPhase::Polling;
        self.status = None;
        self.last_error = None;
        self.stop_reason = None;
        self.current_ticket()
    }

    /// Halts polling. An explicit stop also discards the tracked id and the
    /// last snapshot; a cancel keeps them for display.
    pub(crate) fn stop(&mut self, reason: StopReason) -> bool {
        if !self.is_polling() && self.task_id.is_none() {
            return false;
        }
        self.epoch += 1;
        self.phase = TrackerPhase::Stopped;
        self.stop_reason = Some(reason);
        if matches!(reason, StopReason::Requested | StopReason::LoggedOut) {
            self.task_id = None;
            self.status = None;
            self.last_error = None;
        }
        true
    }

    pub(crate) fn apply_poll(
        &mut self,
        ticket: &PollTicket,
        result: Result<TaskStatus, String>,
    ) -> PollOutcome {
        if !self.is_current(ticket) {
            return PollOutcome::Stale;
        }
        match result {
            Ok(status) => {
                let state = status.state;
                self.status = Some(status);
                self.last_error = None;
                if state.is_terminal() {
                    self.phase = TrackerPhase::Stopped;
                    self.stop_reason = Some(StopReason::Terminal(state));
                    PollOutcome::Terminal(state)
                } else {
                    PollOutcome::Updated
                }
            }
            Err(message) => {
                self.last_error = Some(message);
                PollOutcome::Failed
            }
        }
    }
}
