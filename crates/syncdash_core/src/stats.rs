//! Read-only worker statistics shown alongside the tracker.
use std::collections::BTreeMap;

use crate::TaskState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub id: String,
    pub name: String,
    pub worker: String,
}

impl ActiveTask {
    pub fn display_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveTasks {
    pub active_count: usize,
    pub tasks: Vec<ActiveTask>,
}

impl ActiveTasks {
    /// Number of rows a dashboard card lists.
    pub const CARD_LIMIT: usize = 5;

    pub fn top(&self) -> &[ActiveTask] {
        let end = self.tasks.len().min(Self::CARD_LIMIT);
        &self.tasks[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounts {
    /// Picked up by a worker.
    pub reserved: u64,
    /// Waiting for a worker.
    pub scheduled: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub queues: BTreeMap<String, QueueCounts>,
}

impl QueueStats {
    pub fn total_reserved(&self) -> u64 {
        self.queues.values().map(|q| q.reserved).sum()
    }

    pub fn total_scheduled(&self) -> u64 {
        self.queues.values().map(|q| q.scheduled).sum()
    }

    /// `(display name, reserved + scheduled)` per queue.
    pub fn rows(&self) -> Vec<(String, u64)> {
        self.queues
            .iter()
            .map(|(name, counts)| {
                let display = name.strip_suffix("_queue").unwrap_or(name);
                (display.to_string(), counts.reserved + counts.scheduled)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryWindow {
    LastHour,
    #[default]
    LastDay,
    LastWeek,
}

impl SummaryWindow {
    pub fn from_hours(hours: u32) -> Option<Self> {
        match hours {
            1 => Some(SummaryWindow::LastHour),
            24 => Some(SummaryWindow::LastDay),
            168 => Some(SummaryWindow::LastWeek),
            _ => None,
        }
    }

    pub fn hours(self) -> u32 {
        match self {
            SummaryWindow::LastHour => 1,
            SummaryWindow::LastDay => 24,
            SummaryWindow::LastWeek => 168,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SummaryWindow::LastHour => "Last hour",
            SummaryWindow::LastDay => "Last 24h",
            SummaryWindow::LastWeek => "Last week",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusBreakdown {
    pub success: u64,
    pub failure: u64,
    pub retry: u64,
    pub pending: u64,
}

impl StatusBreakdown {
    pub fn count(&self, state: TaskState) -> u64 {
        match state {
            TaskState::Success => self.success,
            TaskState::Failure => self.failure,
            TaskState::Retry => self.retry,
            TaskState::Pending => self.pending,
            TaskState::Started | TaskState::Progress | TaskState::Revoked => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSummary {
    pub time_range_hours: u32,
    pub status_breakdown: StatusBreakdown,
    pub task_breakdown: BTreeMap<String, u64>,
    pub average_duration_ms: Option<u64>,
    pub total_tasks: u64,
}

impl TaskSummary {
    /// Success share with one decimal, `"0.0"` when nothing ran.
    pub fn success_rate(&self) -> String {
        if self.total_tasks == 0 {
            return "0.0".to_string();
        }
        let rate = self.status_breakdown.success as f64 / self.total_tasks as f64 * 100.0;
        format!("{rate:.1}")
    }

    /// Task names ordered by run count, busiest first.
    pub fn busiest_tasks(&self) -> Vec<(&str, u64)> {
        let mut rows: Vec<_> = self
            .task_breakdown
            .iter()
            .map(|(name, count)| (name.rsplit('.').next().unwrap_or(name), *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }
}

/// Catalogue sync state of the active instance's products.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductSyncStats {
    pub total_products: u64,
    pub never_synced: u64,
    pub synced: u64,
    /// Changed locally since the last sync.
    pub modified: u64,
    pub errors: u64,
    /// Backend timestamp of the last sync run, as sent.
    pub last_sync: Option<String>,
}

impl ProductSyncStats {
    /// Products that still need a sync run.
    pub fn outstanding(&self) -> u64 {
        self.never_synced
            .saturating_add(self.modified)
            .saturating_add(self.errors)
    }
}
