//! JSON bodies exchanged with the sync backend and their mapping onto core
//! types.
use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use syncdash_core::{
    ActiveTask, ActiveTasks, Instance, ProductSyncStats, QueueCounts, QueueStats, StatusBreakdown,
    TaskProgress, TaskState, TaskStatus, TaskSubmission, TaskSummary,
};

use crate::{ApiError, ApiErrorKind};

#[derive(Debug, Deserialize)]
pub(crate) struct TaskInfoWire {
    task_id: String,
    #[serde(default)]
    task_name: Option<String>,
    #[serde(alias = "state")]
    celery_state: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

impl TaskInfoWire {
    pub(crate) fn into_status(self) -> Result<TaskStatus, ApiError> {
        let state = TaskState::parse(&self.celery_state).ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::Decode,
                format!("unknown task state {:?}", self.celery_state),
            )
        })?;

        let progress = match (state, self.result.as_ref()) {
            (TaskState::Progress, Some(Value::Object(fields))) => Some(TaskProgress {
                current: fields.get("current").and_then(Value::as_u64).unwrap_or(0),
                total: fields.get("total").and_then(Value::as_u64).unwrap_or(0),
                message: fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
                percentage: fields
                    .get("percentage")
                    .and_then(Value::as_f64)
                    .map(|pct| pct.clamp(0.0, 100.0).round() as u8),
            }),
            (TaskState::Progress, _) => Some(TaskProgress::default()),
            _ => None,
        };

        let result = match (state, self.result) {
            (TaskState::Success, Some(value)) if !value.is_null() => Some(value.to_string()),
            _ => None,
        };

        let error = match state {
            TaskState::Failure => self.error,
            _ => None,
        };

        Ok(TaskStatus {
            task_id: self.task_id,
            task_name: self.task_name,
            state,
            progress,
            result,
            error,
            duration_ms: self.duration_seconds.and_then(seconds_to_ms),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstanceWire {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    woocommerce_url: String,
    #[serde(default)]
    odoo_url: String,
    #[serde(default)]
    odoo_db: Option<String>,
    #[serde(default)]
    odoo_language: Option<String>,
    #[serde(default)]
    is_active: bool,
}

impl From<InstanceWire> for Instance {
    fn from(wire: InstanceWire) -> Self {
        Instance {
            id: wire.id,
            name: wire.name,
            woocommerce_url: wire.woocommerce_url,
            odoo_url: wire.odoo_url,
            odoo_db: wire.odoo_db,
            odoo_language: wire.odoo_language,
            is_active: wire.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionWire {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    instance_id: Option<u64>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    check_url: Option<String>,
}

impl From<SubmissionWire> for TaskSubmission {
    fn from(wire: SubmissionWire) -> Self {
        TaskSubmission {
            task_id: wire.task_id.unwrap_or_default(),
            status: wire.status.unwrap_or_default(),
            instance_id: wire.instance_id,
            created_at: wire.created_at,
            check_url: wire.check_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActiveTasksWire {
    #[serde(default)]
    active_count: usize,
    #[serde(default)]
    tasks: Vec<ActiveTaskWire>,
}

#[derive(Debug, Deserialize)]
struct ActiveTaskWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    worker: String,
}

impl From<ActiveTasksWire> for ActiveTasks {
    fn from(wire: ActiveTasksWire) -> Self {
        ActiveTasks {
            active_count: wire.active_count,
            tasks: wire
                .tasks
                .into_iter()
                .map(|task| ActiveTask {
                    id: task.id,
                    name: task.name,
                    worker: task.worker,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueStatsWire {
    #[serde(default)]
    queues: BTreeMap<String, QueueCountsWire>,
}

#[derive(Debug, Deserialize)]
struct QueueCountsWire {
    #[serde(default)]
    reserved: u64,
    #[serde(default)]
    scheduled: u64,
}

impl From<QueueStatsWire> for QueueStats {
    fn from(wire: QueueStatsWire) -> Self {
        QueueStats {
            queues: wire
                .queues
                .into_iter()
                .map(|(name, counts)| {
                    (
                        name,
                        QueueCounts {
                            reserved: counts.reserved,
                            scheduled: counts.scheduled,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductSyncStatsWire {
    #[serde(default)]
    total_products: u64,
    #[serde(default)]
    never_synced: u64,
    #[serde(default)]
    synced: u64,
    #[serde(default)]
    modified: u64,
    #[serde(default)]
    errors: u64,
    #[serde(default)]
    last_sync: Option<String>,
}

impl From<ProductSyncStatsWire> for ProductSyncStats {
    fn from(wire: ProductSyncStatsWire) -> Self {
        ProductSyncStats {
            total_products: wire.total_products,
            never_synced: wire.never_synced,
            synced: wire.synced,
            modified: wire.modified,
            errors: wire.errors,
            last_sync: wire.last_sync,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskSummaryWire {
    #[serde(default)]
    time_range_hours: u32,
    #[serde(default)]
    status_breakdown: BreakdownWire,
    #[serde(default)]
    task_breakdown: BTreeMap<String, u64>,
    #[serde(default)]
    average_duration_seconds: Option<f64>,
    #[serde(default)]
    total_tasks: u64,
}

#[derive(Debug, Default, Deserialize)]
struct BreakdownWire {
    #[serde(default)]
    success: u64,
    #[serde(default)]
    failure: u64,
    #[serde(default)]
    retry: u64,
    #[serde(default)]
    pending: u64,
}

impl From<TaskSummaryWire> for TaskSummary {
    fn from(wire: TaskSummaryWire) -> Self {
        TaskSummary {
            time_range_hours: wire.time_range_hours,
            status_breakdown: StatusBreakdown {
                success: wire.status_breakdown.success,
                failure: wire.status_breakdown.failure,
                retry: wire.status_breakdown.retry,
                pending: wire.status_breakdown.pending,
            },
            task_breakdown: wire.task_breakdown,
            average_duration_ms: wire.average_duration_seconds.and_then(seconds_to_ms),
            total_tasks: wire.total_tasks,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginWire {
    pub(crate) access_token: String,
}

/// FastAPI-style error body: `detail` is a string or a list of field errors.
#[derive(Debug, Deserialize)]
struct ErrorBodyWire {
    detail: Value,
}

pub(crate) fn error_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBodyWire = serde_json::from_slice(body).ok()?;
    match parsed.detail {
        Value::String(detail) => Some(detail),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn seconds_to_ms(seconds: f64) -> Option<u64> {
    if seconds.is_finite() && seconds >= 0.0 {
        Some((seconds * 1000.0).round() as u64)
    } else {
        None
    }
}
