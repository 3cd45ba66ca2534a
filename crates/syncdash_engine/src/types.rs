use std::fmt;

use syncdash_core::{
    ActiveTasks, DashboardView, InstanceId, Notification, ProductSyncStats, QueueStats,
    TaskSummary,
};

/// Everything a subscriber needs to re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    ViewChanged(DashboardView),
    InstanceChanged { id: Option<InstanceId> },
    Notification(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub active_tasks: ActiveTasks,
    pub queues: QueueStats,
    pub summary: TaskSummary,
    pub products: ProductSyncStats,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failures worth retrying on the next poll: the server might answer
    /// differently later.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ApiErrorKind::Timeout | ApiErrorKind::Network | ApiErrorKind::Decode => true,
            ApiErrorKind::HttpStatus(code) => code >= 500,
            ApiErrorKind::InvalidUrl
            | ApiErrorKind::NotFound
            | ApiErrorKind::Unauthorized
            | ApiErrorKind::TooLarge { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    InvalidUrl,
    HttpStatus(u16),
    NotFound,
    Unauthorized,
    Timeout,
    Network,
    Decode,
    TooLarge { max_bytes: u64 },
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::InvalidUrl => write!(f, "invalid url"),
            ApiErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            ApiErrorKind::NotFound => write!(f, "not found"),
            ApiErrorKind::Unauthorized => write!(f, "unauthorized"),
            ApiErrorKind::Timeout => write!(f, "timeout"),
            ApiErrorKind::Network => write!(f, "network error"),
            ApiErrorKind::Decode => write!(f, "unexpected response body"),
            ApiErrorKind::TooLarge { max_bytes } => {
                write!(f, "response larger than {max_bytes} bytes")
            }
        }
    }
}
