use std::sync::Arc;

use anyhow::{bail, Context, Result};
use syncdash_core::{
    Instance, InstanceId, NotificationLevel, StopReason, SummaryWindow, TaskState, TrackerPhase,
    ACTIVE_INSTANCE_KEY,
};
use syncdash_engine::{
    Dashboard, DashboardEvent, MemorySharedStore, ReqwestSyncApi, SharedStore, StoreHandle,
};
use syncdash_logging::{sync_info, sync_warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;

use crate::config::Settings;
use crate::persistence::{self, PersistedState};
use crate::render;

/// One CLI invocation: a single dashboard context plus the persisted state
/// it was seeded from.
pub(crate) struct App {
    settings: Settings,
    api: Arc<ReqwestSyncApi>,
    store: Arc<MemorySharedStore>,
    dashboard: Dashboard,
    persisted: PersistedState,
}

impl App {
    pub(crate) fn new(mut settings: Settings) -> Result<Self> {
        let persisted = persistence::load_state(&settings.state_dir);
        if settings.client.token.is_none() {
            settings.client.token = persisted.token().map(ToOwned::to_owned);
        }

        let api = Arc::new(
            ReqwestSyncApi::new(settings.client.clone()).context("Invalid backend settings")?,
        );
        let store = Arc::new(MemorySharedStore::new());
        let dashboard = Dashboard::new(api.clone(), store.clone(), settings.dashboard.clone());
        if let Some(instance) = persisted.active_instance() {
            dashboard.restore_active_instance(instance);
        }

        Ok(Self {
            settings,
            api,
            store,
            dashboard,
            persisted,
        })
    }

    pub(crate) fn shutdown(&self) {
        self.dashboard.shutdown();
    }

    pub(crate) async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token = self
            .api
            .login(username, password)
            .await
            .context("Login failed")?;
        self.persisted.set_token(Some(token));
        persistence::save_state(&self.settings.state_dir, &self.persisted);
        println!("Logged in as {username}");
        Ok(())
    }

    pub(crate) fn logout(&mut self) {
        self.dashboard.clear_instances();
        self.persisted = PersistedState::default();
        persistence::save_state(&self.settings.state_dir, &self.persisted);
        println!("Logged out");
    }

    pub(crate) async fn list_instances(&mut self) -> Result<()> {
        let instances = self
            .dashboard
            .fetch_instances()
            .await
            .context("Could not load instances")?;
        let view = self.dashboard.view();
        println!(
            "{}",
            render::instances(&instances, view.active_instance.as_ref())
        );
        self.remember_active(view.active_instance.as_ref());
        Ok(())
    }

    pub(crate) async fn show_active(&mut self) -> Result<()> {
        let active = self
            .dashboard
            .fetch_active_instance()
            .await
            .context("Could not load the active instance")?;
        println!("{}", render::active_instance(active.as_ref()));
        self.remember_active(active.as_ref());
        Ok(())
    }

    pub(crate) async fn activate(&mut self, id: InstanceId) -> Result<()> {
        match self
            .dashboard
            .activate_instance(id)
            .await
            .with_context(|| format!("Could not activate instance {id}"))?
        {
            Some(instance) => println!("Now working with: {}", instance.name),
            None => println!("Instance {id} is already active"),
        }
        let active = self.dashboard.view().active_instance;
        self.remember_active(active.as_ref());
        Ok(())
    }

    pub(crate) async fn track(&self, task_id: &str) -> Result<()> {
        if task_id.trim().is_empty() {
            bail!("No task to track");
        }
        let events = self.dashboard.subscribe();
        self.dashboard.start_tracking(task_id);
        self.follow(events).await
    }

    pub(crate) async fn cancel(&self, task_id: &str) -> Result<()> {
        let mut events = self.dashboard.subscribe();
        self.dashboard.cancel(task_id).await;
        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let DashboardEvent::Notification(notification) = event {
                failed |= notification.level == NotificationLevel::Error;
                println!("{}", render::notification(&notification));
            }
        }
        if failed {
            bail!("Task {task_id} was not cancelled");
        }
        Ok(())
    }

    pub(crate) async fn sync(
        &self,
        endpoint: &str,
        payload: Option<&str>,
        detach: bool,
    ) -> Result<()> {
        let payload: serde_json::Value = match payload {
            Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
            None => serde_json::Value::Object(serde_json::Map::new()),
        };
        let events = self.dashboard.subscribe();
        let submission = self
            .dashboard
            .submit(endpoint, &payload)
            .await
            .with_context(|| format!("Could not start sync at {endpoint}"))?;
        println!("Started task {}", submission.task_id);
        if detach {
            self.dashboard.stop_tracking();
            return Ok(());
        }
        self.follow(events).await
    }

    /// Prints worker statistics once, or every `stats_refresh` with `watch`.
    /// While watching, a failed refresh is reported and the next one tried.
    pub(crate) async fn stats(&self, hours: u32, watch: bool) -> Result<()> {
        let Some(window) = SummaryWindow::from_hours(hours) else {
            bail!("--hours must be 1, 24 or 168");
        };
        if !watch {
            let stats = self
                .dashboard
                .stats(window)
                .await
                .context("Could not load worker statistics")?;
            println!("{}", render::stats(&stats));
            return Ok(());
        }

        let mut ticker = tokio::time::interval(self.settings.stats_refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(()),
                _ = ticker.tick() => match self.dashboard.stats(window).await {
                    Ok(stats) => println!("{}\n", render::stats(&stats)),
                    Err(err) => sync_warn!("Could not refresh worker statistics: {}", err),
                },
            }
        }
    }

    /// Follows the shared store and dashboard events until Ctrl-C.
    ///
    /// Other `syncdash` processes only share the state file, so its active
    /// instance is written into the store from a separate context; the
    /// dashboard then re-validates it against the backend.
    pub(crate) async fn watch(&mut self) -> Result<()> {
        let disk = StoreHandle::open(self.store.clone() as Arc<dyn SharedStore>);
        let mut events = self.dashboard.subscribe();
        if let Err(err) = self.dashboard.fetch_instances().await {
            sync_warn!("Initial instance load failed: {}", err);
        }
        let mut last_on_disk = self.persisted.active_id();
        println!(
            "{}",
            render::active_instance(self.dashboard.view().active_instance.as_ref())
        );

        let mut ticker = tokio::time::interval(self.settings.dashboard.poll_interval);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = ticker.tick() => {
                    let on_disk = persistence::load_state(&self.settings.state_dir).active_id();
                    if on_disk != last_on_disk {
                        sync_info!("State file changed active instance to {:?}", on_disk);
                        last_on_disk = on_disk;
                        match on_disk {
                            Some(id) => disk.set(ACTIVE_INSTANCE_KEY, &id.to_string()),
                            None => disk.remove(ACTIVE_INSTANCE_KEY),
                        }
                    }
                }
                event = events.recv() => match event {
                    Ok(DashboardEvent::InstanceChanged { .. }) => {
                        let active = self.dashboard.view().active_instance;
                        println!("{}", render::active_instance(active.as_ref()));
                        last_on_disk = active.as_ref().map(|instance| instance.id);
                        self.remember_active(active.as_ref());
                    }
                    Ok(DashboardEvent::Notification(notification)) => {
                        println!("{}", render::notification(&notification));
                    }
                    Ok(DashboardEvent::ViewChanged(_)) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }

    async fn follow(&self, mut events: broadcast::Receiver<DashboardEvent>) -> Result<()> {
        let mut last_line = String::new();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.dashboard.stop_tracking();
                    println!("Stopped tracking");
                    return Ok(());
                }
                event = events.recv() => match event {
                    Ok(DashboardEvent::ViewChanged(view)) => {
                        let line = render::tracker(&view.tracker);
                        if line != last_line {
                            println!("{line}");
                            last_line = line;
                        }
                        if view.tracker.phase == TrackerPhase::Stopped {
                            return match view.tracker.stop_reason {
                                Some(StopReason::Terminal(TaskState::Failure)) => {
                                    bail!("Task failed")
                                }
                                Some(StopReason::Terminal(TaskState::Revoked)) => {
                                    bail!("Task was cancelled")
                                }
                                _ => Ok(()),
                            };
                        }
                    }
                    Ok(DashboardEvent::Notification(notification)) => {
                        eprintln!("{}", render::notification(&notification));
                    }
                    Ok(DashboardEvent::InstanceChanged { .. }) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    fn remember_active(&mut self, active: Option<&Instance>) {
        if self.persisted.active_id() == active.map(|instance| instance.id) {
            return;
        }
        self.persisted.set_active_instance(active);
        persistence::save_state(&self.settings.state_dir, &self.persisted);
    }
}
