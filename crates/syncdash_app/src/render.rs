//! Plain-text rendering of dashboard views for the terminal.
use syncdash_core::{
    Instance, Notification, NotificationLevel, StopReason, TaskState, TaskStatus, TrackerPhase,
    TrackerView,
};
use syncdash_engine::StatsSnapshot;

pub(crate) fn tracker(view: &TrackerView) -> String {
    let Some(task_id) = view.task_id.as_deref() else {
        return match view.phase {
            TrackerPhase::Stopped => "Tracking stopped".to_string(),
            _ => "No task tracked".to_string(),
        };
    };

    let mut line = match &view.status {
        Some(status) => format_status(status),
        None => format!("[{task_id}] waiting for first status..."),
    };
    if let Some(error) = &view.last_error {
        line.push_str(&format!(" (last poll failed: {error})"));
    }
    if let Some(reason) = view.stop_reason {
        line.push_str(&format!(" [{}]", stop_label(reason)));
    }
    line
}

fn format_status(status: &TaskStatus) -> String {
    let mut line = format!(
        "[{id}] {name} {state}",
        id = status.short_id(),
        name = status.display_name(),
        state = state_label(status.state)
    );
    if let Some(progress) = &status.progress {
        line.push_str(&format!(" {}%", progress.percent()));
        if progress.total > 0 {
            line.push_str(&format!(" ({}/{})", progress.current, progress.total));
        }
        if let Some(message) = &progress.message {
            line.push_str(&format!(" {message}"));
        }
    }
    if let Some(ms) = status.duration_ms {
        line.push_str(&format!(" in {}", format_duration(ms)));
    }
    if let Some(error) = &status.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

fn state_label(state: TaskState) -> &'static str {
    match state {
        TaskState::Pending => "Queued",
        TaskState::Started => "Started",
        TaskState::Progress => "Running",
        TaskState::Success => "Completed",
        TaskState::Failure => "Failed",
        TaskState::Retry => "Retrying",
        TaskState::Revoked => "Cancelled",
    }
}

fn stop_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Requested => "stopped",
        StopReason::Cancelled => "cancelled",
        StopReason::Terminal(_) => "finished",
        StopReason::LoggedOut => "logged out",
    }
}

pub(crate) fn instances(instances: &[Instance], active: Option<&Instance>) -> String {
    if instances.is_empty() {
        return "No instances configured".to_string();
    }
    let active_id = active.map(|instance| instance.id);
    instances
        .iter()
        .map(|instance| {
            let marker = if Some(instance.id) == active_id { "*" } else { " " };
            format!(
                "{marker} {id:>4}  {name}  {woo} -> {odoo}",
                id = instance.id,
                name = instance.name,
                woo = instance.woocommerce_url,
                odoo = instance.odoo_url
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn active_instance(active: Option<&Instance>) -> String {
    match active {
        Some(instance) => format!("Active instance: {} (#{})", instance.name, instance.id),
        None => "No active instance".to_string(),
    }
}

pub(crate) fn stats(stats: &StatsSnapshot) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Active tasks: {}", stats.active_tasks.active_count));
    for task in stats.active_tasks.top() {
        lines.push(format!("  {}  {}  {}", task.id, task.display_name(), task.worker));
    }

    lines.push(format!(
        "Queued: {} reserved, {} scheduled",
        format_with_commas(stats.queues.total_reserved()),
        format_with_commas(stats.queues.total_scheduled())
    ));
    for (name, count) in stats.queues.rows() {
        lines.push(format!("  {name}: {count}"));
    }

    let summary = &stats.summary;
    lines.push(format!(
        "Last {}h: {} tasks, {}% success",
        summary.time_range_hours,
        format_with_commas(summary.total_tasks),
        summary.success_rate()
    ));
    if let Some(ms) = summary.average_duration_ms {
        lines.push(format!("  average duration {}", format_duration(ms)));
    }
    for (name, count) in summary.busiest_tasks() {
        lines.push(format!("  {name}: {count}"));
    }

    let products = &stats.products;
    lines.push(format!(
        "Products: {} total, {} synced, {} never synced, {} modified, {} errors",
        format_with_commas(products.total_products),
        format_with_commas(products.synced),
        format_with_commas(products.never_synced),
        format_with_commas(products.modified),
        format_with_commas(products.errors)
    ));
    lines.push(format!(
        "  last sync: {}",
        products.last_sync.as_deref().unwrap_or("never")
    ));
    lines.join("\n")
}

pub(crate) fn notification(notification: &Notification) -> String {
    let level = match notification.level {
        NotificationLevel::Info => "info",
        NotificationLevel::Success => "ok",
        NotificationLevel::Warning => "warning",
        NotificationLevel::Error => "error",
    };
    format!("{level}: {}: {}", notification.title, notification.message)
}

fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

fn format_with_commas(value: u64) -> String {
    let mut out = String::new();
    for (i, ch) in value.to_string().chars().rev().enumerate() {
        if i != 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.chars().rev().collect()
}
