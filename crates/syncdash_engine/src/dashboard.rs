//! Effect runner around the pure core state machine.
//!
//! A [`Dashboard`] owns one context's [`AppState`]. Messages go through
//! [`update`]; the effects it returns are executed here: polling loops are
//! spawned, REST calls are made through [`SyncApi`], and the active instance
//! is mirrored into the shared store.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use syncdash_core::{
    update, AppState, DashboardView, Effect, Epoch, Instance, InstanceId, Msg, Notification,
    NotificationLevel, SummaryWindow, TaskSubmission, ACTIVE_INSTANCE_KEY,
};
use syncdash_logging::{sync_debug, sync_error, sync_info, sync_warn};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::poller::run_poll_loop;
use crate::store::{ForeignChange, SharedStore, StoreHandle};
use crate::{ApiError, DashboardEvent, StatsSnapshot, SyncApi};

const EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub poll_interval: Duration,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Handle to one dashboard context. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn SyncApi>,
    store: StoreHandle,
    settings: DashboardSettings,
    state: Mutex<AppState>,
    events: broadcast::Sender<DashboardEvent>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    polling: Mutex<Option<(Epoch, CancellationToken)>>,
    shutdown: CancellationToken,
}

/// Effects that need a round trip to the backend.
enum Remote {
    Cancel {
        task_id: String,
        epoch: Option<Epoch>,
    },
    ListInstances,
    ActiveInstance,
    Activate {
        id: InstanceId,
    },
}

impl Dashboard {
    /// Opens a new context on `store`. Must be called from within a tokio
    /// runtime; background tasks run until [`Dashboard::shutdown`] or until
    /// the last clone is dropped.
    pub fn new(
        api: Arc<dyn SyncApi>,
        store: Arc<dyn SharedStore>,
        settings: DashboardSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let dashboard = Self {
            inner: Arc::new(Inner {
                api,
                store: StoreHandle::open(store),
                settings,
                state: Mutex::new(AppState::new()),
                events,
                msg_tx,
                polling: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        };
        dashboard.spawn_driver(msg_rx);
        dashboard.spawn_store_listener();
        sync_debug!("Dashboard context {} opened", dashboard.inner.store.context());
        dashboard
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.inner.events.subscribe()
    }

    pub fn view(&self) -> DashboardView {
        lock(&self.inner.state).view()
    }

    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    /// Applies `msg` without waiting; backend calls it triggers run in the
    /// background and feed their results back in.
    pub fn dispatch(&self, msg: Msg) {
        for effect in self.apply(msg) {
            if let Some(remote) = self.execute(effect) {
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    let msg = perform(inner.api.as_ref(), remote).await;
                    let _ = inner.msg_tx.send(msg);
                });
            }
        }
    }

    /// Applies `msg` and waits for every backend call it triggers, and the
    /// ones those trigger in turn. Polling loops are not waited for.
    pub async fn send(&self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            for effect in self.apply(msg) {
                if let Some(remote) = self.execute(effect) {
                    queue.push_back(perform(self.inner.api.as_ref(), remote).await);
                }
            }
        }
    }

    pub fn start_tracking(&self, task_id: impl Into<String>) {
        self.dispatch(Msg::StartTracking {
            task_id: task_id.into(),
        });
    }

    pub fn stop_tracking(&self) {
        self.dispatch(Msg::StopTracking);
    }

    /// Asks the backend to cancel `task_id`. Tracking of that task stops
    /// locally whatever the backend answers.
    pub async fn cancel(&self, task_id: &str) {
        self.send(Msg::CancelRequested {
            task_id: task_id.to_string(),
        })
        .await;
    }

    /// Submits a sync job and starts tracking the task it created.
    pub async fn submit(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskSubmission, ApiError> {
        match self.inner.api.submit_sync(endpoint, payload).await {
            Ok(submission) => {
                sync_info!("Submitted {} as task {}", endpoint, submission.task_id);
                self.start_tracking(submission.task_id.clone());
                Ok(submission)
            }
            Err(err) => {
                self.notify(Notification::error("Sync failed", err.to_string()));
                Err(err)
            }
        }
    }

    pub async fn fetch_instances(&self) -> Result<Vec<Instance>, ApiError> {
        let result = self.inner.api.list_instances().await;
        self.send(Msg::InstancesLoaded(
            result.clone().map_err(|err| err.to_string()),
        ))
        .await;
        result
    }

    /// Re-validates the active instance. A missing one clears the selection;
    /// any other failure keeps the cached value.
    pub async fn fetch_active_instance(&self) -> Result<Option<Instance>, ApiError> {
        let result = self.inner.api.active_instance().await;
        self.send(Msg::ActiveInstanceLoaded(
            result.clone().map_err(|err| err.to_string()),
        ))
        .await;
        result
    }

    /// Makes `id` the active instance. Returns `Ok(None)` when the server
    /// already confirmed it as active and no backend call was made; a
    /// selection only restored from disk is always sent to the backend.
    pub async fn activate_instance(&self, id: InstanceId) -> Result<Option<Instance>, ApiError> {
        let mut outcome = Ok(None);
        for effect in self.apply(Msg::ActivateRequested { id }) {
            match effect {
                Effect::ActivateInstance { id } => {
                    let result = self.inner.api.activate_instance(id).await;
                    outcome = result.clone().map(Some);
                    self.send(Msg::ActivateCompleted {
                        id,
                        result: result.map_err(|err| err.to_string()),
                    })
                    .await;
                }
                other => {
                    if let Some(remote) = self.execute(other) {
                        let msg = perform(self.inner.api.as_ref(), remote).await;
                        self.send(msg).await;
                    }
                }
            }
        }
        outcome
    }

    /// Drops every cached instance and stops tracking; used on logout.
    pub fn clear_instances(&self) {
        self.dispatch(Msg::LoggedOut);
    }

    /// Seeds the active selection from a persisted snapshot. Ignored once the
    /// instance list has been loaded.
    pub fn restore_active_instance(&self, instance: Instance) {
        self.dispatch(Msg::RestoreActiveInstance(instance));
    }

    pub async fn stats(&self, window: SummaryWindow) -> Result<StatsSnapshot, ApiError> {
        let api = self.inner.api.as_ref();
        let (active_tasks, queues, summary, products) = futures_util::future::try_join4(
            api.active_tasks(),
            api.queue_stats(),
            api.task_summary(window),
            api.product_sync_stats(),
        )
        .await?;
        Ok(StatsSnapshot {
            active_tasks,
            queues,
            summary,
            products,
        })
    }

    /// Stops polling and background listeners of this context.
    pub fn shutdown(&self) {
        if let Some((_, token)) = lock(&self.inner.polling).take() {
            token.cancel();
        }
        self.inner.shutdown.cancel();
        sync_debug!("Dashboard context {} shut down", self.inner.store.context());
    }

    fn apply(&self, msg: Msg) -> Vec<Effect> {
        let (effects, view) = {
            let mut state = lock(&self.inner.state);
            let (next, effects) = update(std::mem::take(&mut *state), msg);
            *state = next;
            let view = state.view();
            let changed = state.consume_dirty();
            (effects, changed.then_some(view))
        };
        if let Some(view) = view {
            let _ = self.inner.events.send(DashboardEvent::ViewChanged(view));
        }
        effects
    }

    /// Runs local effects directly and hands back the ones that need the
    /// backend.
    fn execute(&self, effect: Effect) -> Option<Remote> {
        match effect {
            Effect::StartPolling { ticket } => {
                // Lock order: polling, then state.
                let mut polling = lock(&self.inner.polling);
                if current_epoch(&self.inner) != Some(ticket.epoch) {
                    sync_debug!("Not starting poll loop for stale epoch {}", ticket.epoch);
                    return None;
                }
                if polling.as_ref().is_some_and(|(epoch, _)| *epoch == ticket.epoch) {
                    return None;
                }
                let token = self.inner.shutdown.child_token();
                if let Some((_, previous)) = polling.replace((ticket.epoch, token.clone())) {
                    previous.cancel();
                }
                tokio::spawn(run_poll_loop(
                    self.inner.api.clone(),
                    ticket,
                    self.inner.settings.poll_interval,
                    token,
                    self.inner.msg_tx.clone(),
                ));
                None
            }
            Effect::HaltPolling => {
                let mut polling = lock(&self.inner.polling);
                let current = current_epoch(&self.inner);
                if polling.as_ref().is_some_and(|(epoch, _)| Some(*epoch) != current) {
                    if let Some((epoch, token)) = polling.take() {
                        sync_debug!("Halting poll loop for epoch {}", epoch);
                        token.cancel();
                    }
                }
                None
            }
            Effect::CancelTask { task_id, epoch } => Some(Remote::Cancel { task_id, epoch }),
            Effect::FetchInstances => Some(Remote::ListInstances),
            Effect::FetchActiveInstance => Some(Remote::ActiveInstance),
            Effect::ActivateInstance { id } => Some(Remote::Activate { id }),
            Effect::MirrorActiveInstance { id } => {
                match id {
                    Some(id) => self.inner.store.set(ACTIVE_INSTANCE_KEY, &id.to_string()),
                    None => self.inner.store.remove(ACTIVE_INSTANCE_KEY),
                }
                None
            }
            Effect::BroadcastInstanceChanged { id } => {
                sync_info!("Active instance is now {:?}", id);
                let _ = self.inner.events.send(DashboardEvent::InstanceChanged { id });
                None
            }
            Effect::Notify(notification) => {
                self.notify(notification);
                None
            }
        }
    }

    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info | NotificationLevel::Success => {
                sync_info!("{}: {}", notification.title, notification.message)
            }
            NotificationLevel::Warning => {
                sync_warn!("{}: {}", notification.title, notification.message)
            }
            NotificationLevel::Error => {
                sync_error!("{}: {}", notification.title, notification.message)
            }
        }
        let _ = self.inner.events.send(DashboardEvent::Notification(notification));
    }

    /// The driver only holds a weak reference so that dropping the last
    /// `Dashboard` tears the context down.
    fn spawn_driver(&self, mut msg_rx: mpsc::UnboundedReceiver<Msg>) {
        let weak = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    msg = msg_rx.recv() => msg,
                };
                let (Some(msg), Some(inner)) = (msg, weak.upgrade()) else {
                    break;
                };
                Dashboard { inner }.dispatch(msg);
            }
        });
    }

    fn spawn_store_listener(&self) {
        let mut changes = self.inner.store.foreign_changes();
        let store = self.inner.store.clone();
        let msg_tx = self.inner.msg_tx.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    change = changes.next() => change,
                };
                let value = match change {
                    Some(ForeignChange::Write(change)) if change.key == ACTIVE_INSTANCE_KEY => {
                        change.new_value
                    }
                    Some(ForeignChange::Write(_)) => continue,
                    Some(ForeignChange::Missed(skipped)) => {
                        sync_warn!("Missed {} shared store changes; re-reading", skipped);
                        store.get(ACTIVE_INSTANCE_KEY)
                    }
                    None => break,
                };
                if msg_tx.send(Msg::ForeignActiveChanged { value }).is_err() {
                    break;
                }
            }
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn current_epoch(inner: &Inner) -> Option<Epoch> {
    lock(&inner.state)
        .tracker()
        .current_ticket()
        .map(|ticket| ticket.epoch)
}

async fn perform(api: &dyn SyncApi, remote: Remote) -> Msg {
    match remote {
        Remote::Cancel { task_id, epoch } => {
            let result = api.cancel_task(&task_id).await.map_err(|err| err.to_string());
            Msg::CancelFinished {
                task_id,
                epoch,
                result,
            }
        }
        Remote::ListInstances => {
            Msg::InstancesLoaded(api.list_instances().await.map_err(|err| err.to_string()))
        }
        Remote::ActiveInstance => {
            Msg::ActiveInstanceLoaded(api.active_instance().await.map_err(|err| err.to_string()))
        }
        Remote::Activate { id } => Msg::ActivateCompleted {
            id,
            result: api
                .activate_instance(id)
                .await
                .map_err(|err| err.to_string()),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
