use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use syncdash_core::{
    ActiveTasks, DashboardView, Instance, InstanceId, NotificationLevel, ProductSyncStats,
    QueueStats, StopReason, SummaryWindow, TaskState, TaskStatus, TaskSubmission, TaskSummary,
    TrackerPhase, ACTIVE_INSTANCE_KEY,
};
use syncdash_engine::{
    ApiError, ApiErrorKind, Dashboard, DashboardEvent, DashboardSettings, MemorySharedStore,
    SharedStore, SyncApi,
};
use tokio::sync::{broadcast, Notify};

/// In-memory backend: scripted task statuses and a server-side instance list.
#[derive(Default)]
struct FakeApi {
    statuses: Mutex<VecDeque<TaskState>>,
    status_calls: AtomicUsize,
    /// Status calls that fail before the script is consulted.
    failures: AtomicUsize,
    gate: Option<Arc<Notify>>,
    cancel_error: Option<ApiError>,
    instances: Mutex<Vec<Instance>>,
    active: Mutex<Option<InstanceId>>,
    activations: AtomicUsize,
}

impl FakeApi {
    fn with_statuses(states: &[TaskState]) -> Self {
        Self {
            statuses: Mutex::new(states.iter().copied().collect()),
            ..Self::default()
        }
    }

    fn with_instances(count: u64, active: Option<InstanceId>) -> Self {
        Self {
            instances: Mutex::new(
                (1..=count)
                    .map(|id| Instance::new(id, format!("shop-{id}"), false))
                    .collect(),
            ),
            active: Mutex::new(active),
            ..Self::default()
        }
    }

    fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn instance(&self, id: InstanceId) -> Option<Instance> {
        let active = *self.active.lock().unwrap();
        self.instances
            .lock()
            .unwrap()
            .iter()
            .find(|instance| instance.id == id)
            .map(|instance| Instance {
                is_active: active == Some(id),
                ..instance.clone()
            })
    }
}

#[async_trait::async_trait]
impl SyncApi for FakeApi {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ApiError::new(ApiErrorKind::Timeout, "backend busy"));
        }
        let state = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().copied()
            }
        };
        match state {
            Some(state) => Ok(TaskStatus::new(task_id, state)),
            None => Err(ApiError::new(ApiErrorKind::Network, "no script")),
        }
    }

    async fn cancel_task(&self, _task_id: &str) -> Result<(), ApiError> {
        match &self.cancel_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, ApiError> {
        let ids: Vec<_> = self.instances.lock().unwrap().iter().map(|i| i.id).collect();
        Ok(ids.into_iter().filter_map(|id| self.instance(id)).collect())
    }

    async fn active_instance(&self) -> Result<Option<Instance>, ApiError> {
        let active = *self.active.lock().unwrap();
        Ok(active.and_then(|id| self.instance(id)))
    }

    async fn activate_instance(&self, id: InstanceId) -> Result<Instance, ApiError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        if self.instance(id).is_none() {
            return Err(ApiError::new(ApiErrorKind::NotFound, "Instance not found"));
        }
        *self.active.lock().unwrap() = Some(id);
        Ok(self.instance(id).unwrap())
    }

    async fn submit_sync(
        &self,
        _endpoint: &str,
        _payload: &serde_json::Value,
    ) -> Result<TaskSubmission, ApiError> {
        Ok(TaskSubmission {
            task_id: "submitted-1".to_string(),
            status: "queued".to_string(),
            instance_id: *self.active.lock().unwrap(),
            created_at: None,
            check_url: None,
        })
    }

    async fn active_tasks(&self) -> Result<ActiveTasks, ApiError> {
        Ok(ActiveTasks::default())
    }

    async fn queue_stats(&self) -> Result<QueueStats, ApiError> {
        Ok(QueueStats::default())
    }

    async fn task_summary(&self, window: SummaryWindow) -> Result<TaskSummary, ApiError> {
        Ok(TaskSummary {
            time_range_hours: window.hours(),
            ..TaskSummary::default()
        })
    }

    async fn product_sync_stats(&self) -> Result<ProductSyncStats, ApiError> {
        Ok(ProductSyncStats {
            total_products: 12,
            synced: 12,
            ..ProductSyncStats::default()
        })
    }
}

fn dashboard(api: &Arc<FakeApi>, store: &Arc<MemorySharedStore>) -> Dashboard {
    syncdash_logging::initialize_for_tests();
    Dashboard::new(api.clone(), store.clone(), DashboardSettings::default())
}

async fn wait_for_view(
    events: &mut broadcast::Receiver<DashboardEvent>,
    done: impl Fn(&DashboardView) -> bool,
) -> DashboardView {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            if let Ok(DashboardEvent::ViewChanged(view)) = events.recv().await {
                if done(&view) {
                    return view;
                }
            }
        }
    })
    .await
    .expect("view never reached the expected state")
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test(start_paused = true)]
async fn polling_stops_at_terminal_state() {
    let api = Arc::new(FakeApi::with_statuses(&[
        TaskState::Pending,
        TaskState::Progress,
        TaskState::Success,
    ]));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);
    let mut events = dash.subscribe();

    dash.start_tracking("task-1");
    let view = wait_for_view(&mut events, |view| view.tracker.phase == TrackerPhase::Stopped).await;

    assert_eq!(
        view.tracker.stop_reason,
        Some(StopReason::Terminal(TaskState::Success))
    );
    assert!(!view.tracker.can_cancel);
    assert_eq!(api.status_calls(), 3);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.status_calls(), 3);
    dash.shutdown();
}

#[tokio::test(start_paused = true)]
async fn polls_follow_the_interval() {
    let api = Arc::new(FakeApi::with_statuses(&[TaskState::Started]));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    dash.start_tracking("task-1");
    wait_until(|| api.status_calls() == 1).await;

    tokio::time::sleep(Duration::from_millis(4_100)).await;
    assert_eq!(api.status_calls(), 3);
    dash.shutdown();
}

#[tokio::test(start_paused = true)]
async fn failed_polls_keep_the_loop_running() {
    let api = Arc::new(FakeApi {
        failures: AtomicUsize::new(3),
        ..FakeApi::with_statuses(&[TaskState::Success])
    });
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    dash.start_tracking("task-1");
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(api.status_calls(), 1);
    assert!(dash.view().tracker.last_error.is_some());

    for expected in 2..=3 {
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.status_calls(), expected);
        assert_eq!(dash.view().tracker.phase, TrackerPhase::Polling);
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(api.status_calls(), 4);
    let view = dash.view();
    assert_eq!(
        view.tracker.stop_reason,
        Some(StopReason::Terminal(TaskState::Success))
    );
    assert_eq!(view.tracker.last_error, None);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.status_calls(), 4);
    dash.shutdown();
}

#[tokio::test(start_paused = true)]
async fn blank_task_id_is_reported() {
    let api = Arc::new(FakeApi::with_statuses(&[TaskState::Progress]));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);
    let mut events = dash.subscribe();

    dash.start_tracking("   ");

    match events.try_recv() {
        Ok(DashboardEvent::Notification(notification)) => {
            assert_eq!(notification.level, NotificationLevel::Warning);
        }
        other => panic!("expected a warning, got {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.status_calls(), 0);
    assert_eq!(dash.view().tracker.phase, TrackerPhase::Untracked);
    dash.shutdown();
}

#[tokio::test(start_paused = true)]
async fn dropping_the_dashboard_stops_polling() {
    let api = Arc::new(FakeApi::with_statuses(&[TaskState::Progress]));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    dash.start_tracking("task-1");
    wait_until(|| api.status_calls() == 1).await;
    drop(dash);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn response_arriving_after_stop_is_discarded() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(FakeApi {
        gate: Some(gate.clone()),
        ..FakeApi::with_statuses(&[TaskState::Progress])
    });
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    dash.start_tracking("task-1");
    wait_until(|| api.status_calls() == 1).await;

    dash.stop_tracking();
    gate.notify_one();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let view = dash.view();
    assert_eq!(view.tracker.phase, TrackerPhase::Stopped);
    assert_eq!(view.tracker.status, None);
    assert_eq!(view.tracker.task_id, None);
    assert_eq!(api.status_calls(), 1);
    dash.shutdown();
}

#[tokio::test(start_paused = true)]
async fn tracking_a_new_task_replaces_the_old_one() {
    let api = Arc::new(FakeApi::with_statuses(&[TaskState::Progress]));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);
    let mut events = dash.subscribe();

    dash.start_tracking("first");
    dash.start_tracking("second");
    let view = wait_for_view(&mut events, |view| view.tracker.status.is_some()).await;

    assert_eq!(view.tracker.task_id.as_deref(), Some("second"));
    assert_eq!(
        view.tracker.status.map(|status| status.task_id),
        Some("second".to_string())
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        dash.view().tracker.status.map(|status| status.task_id),
        Some("second".to_string())
    );
    dash.shutdown();
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_tracking_even_when_backend_refuses() {
    let api = Arc::new(FakeApi {
        cancel_error: Some(ApiError::new(
            ApiErrorKind::HttpStatus(409),
            "Task already finished",
        )),
        ..FakeApi::with_statuses(&[TaskState::Progress])
    });
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);
    let mut events = dash.subscribe();

    dash.start_tracking("task-1");
    wait_until(|| api.status_calls() >= 1).await;
    dash.cancel("task-1").await;

    let view = dash.view();
    assert_eq!(view.tracker.phase, TrackerPhase::Stopped);
    assert_eq!(view.tracker.stop_reason, Some(StopReason::Cancelled));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let DashboardEvent::Notification(notification) = event {
            saw_error |= notification.level == NotificationLevel::Error;
        }
    }
    assert!(saw_error);

    let calls = api.status_calls();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.status_calls(), calls);
    dash.shutdown();
}

#[tokio::test]
async fn submit_starts_tracking_the_new_task() {
    let api = Arc::new(FakeApi::with_statuses(&[TaskState::Pending]));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    let submission = dash
        .submit("/api/v1/sync/products", &serde_json::json!({}))
        .await
        .expect("submit");

    assert_eq!(submission.task_id, "submitted-1");
    assert_eq!(dash.view().tracker.task_id.as_deref(), Some("submitted-1"));
    dash.shutdown();
}

#[tokio::test]
async fn active_instance_is_mirrored_into_shared_key() {
    let api = Arc::new(FakeApi::with_instances(3, Some(2)));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    dash.fetch_instances().await.expect("instances");
    assert_eq!(store.get(ACTIVE_INSTANCE_KEY).as_deref(), Some("2"));

    *api.active.lock().unwrap() = None;
    assert_eq!(dash.fetch_active_instance().await, Ok(None));
    assert_eq!(store.get(ACTIVE_INSTANCE_KEY), None);
    assert_eq!(dash.view().active_instance, None);
    dash.shutdown();
}

#[tokio::test]
async fn activating_the_active_instance_skips_the_backend() {
    let api = Arc::new(FakeApi::with_instances(2, Some(1)));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);
    dash.fetch_instances().await.expect("instances");

    assert_eq!(dash.activate_instance(1).await, Ok(None));
    assert_eq!(api.activations.load(Ordering::SeqCst), 0);

    let activated = dash.activate_instance(2).await.expect("activate");
    assert_eq!(activated.map(|instance| instance.id), Some(2));
    assert_eq!(api.activations.load(Ordering::SeqCst), 1);
    dash.shutdown();
}

#[tokio::test]
async fn restored_selection_is_confirmed_with_the_backend() {
    let api = Arc::new(FakeApi::with_instances(2, Some(2)));
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);
    dash.restore_active_instance(Instance::new(1, "shop-1", true));

    let activated = dash.activate_instance(1).await.expect("activate");

    assert_eq!(activated.map(|instance| instance.id), Some(1));
    assert_eq!(api.activations.load(Ordering::SeqCst), 1);
    assert_eq!(*api.active.lock().unwrap(), Some(1));
    dash.shutdown();
}

#[tokio::test]
async fn activation_in_one_context_reaches_the_other() {
    let api = Arc::new(FakeApi::with_instances(3, Some(1)));
    let store = Arc::new(MemorySharedStore::new());
    let first = dashboard(&api, &store);
    let second = dashboard(&api, &store);
    first.fetch_instances().await.expect("instances");
    second.fetch_instances().await.expect("instances");
    let mut second_events = second.subscribe();

    first.activate_instance(3).await.expect("activate");

    let changed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(DashboardEvent::InstanceChanged { id }) = second_events.recv().await {
                return id;
            }
        }
    })
    .await
    .expect("second context never heard about the change");

    assert_eq!(changed, Some(3));
    assert_eq!(
        second.view().active_instance.map(|instance| instance.id),
        Some(3)
    );
    assert_eq!(store.get(ACTIVE_INSTANCE_KEY).as_deref(), Some("3"));
    first.shutdown();
    second.shutdown();
}

#[tokio::test]
async fn stats_are_fetched_together() {
    let api = Arc::new(FakeApi::default());
    let store = Arc::new(MemorySharedStore::new());
    let dash = dashboard(&api, &store);

    let stats = dash.stats(SummaryWindow::LastHour).await.expect("stats");
    assert_eq!(stats.summary.time_range_hours, 1);
    assert_eq!(stats.products.total_products, 12);
    assert_eq!(stats.products.outstanding(), 0);
    dash.shutdown();
}
