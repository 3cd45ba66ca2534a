use crate::{
    AppState, Effect, Instance, InstanceId, Msg, Notification, PollOutcome, StopReason,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartTracking { task_id } => {
            let was_polling = state.tracker().is_polling();
            match state.tracker_mut().start(&task_id) {
                Some(ticket) => {
                    state.mark_dirty();
                    let mut effects = Vec::with_capacity(2);
                    if was_polling {
                        effects.push(Effect::HaltPolling);
                    }
                    effects.push(Effect::StartPolling { ticket });
                    effects
                }
                None => vec![Effect::Notify(Notification::warning(
                    "Tracking",
                    "No task to track",
                ))],
            }
        }
        Msg::StopTracking => {
            if state.tracker_mut().stop(StopReason::Requested) {
                state.mark_dirty();
                vec![Effect::HaltPolling]
            } else {
                Vec::new()
            }
        }
        Msg::CancelRequested { task_id } => {
            let task_id = task_id.trim().to_string();
            if task_id.is_empty() {
                return (
                    state,
                    vec![Effect::Notify(Notification::warning(
                        "Cancel",
                        "No task to cancel",
                    ))],
                );
            }
            let epoch = state
                .tracker()
                .current_ticket()
                .filter(|ticket| ticket.task_id == task_id)
                .map(|ticket| ticket.epoch);
            vec![Effect::CancelTask { task_id, epoch }]
        }
        Msg::CancelFinished {
            task_id,
            epoch,
            result,
        } => {
            let mut effects = Vec::with_capacity(2);
            // Local polling stops whatever the backend answered, but only if
            // the same tracking session is still running.
            let still_current = epoch.is_some_and(|epoch| {
                state.tracker().is_polling() && state.tracker().epoch() == epoch
            });
            if still_current && state.tracker_mut().stop(StopReason::Cancelled) {
                state.mark_dirty();
                effects.push(Effect::HaltPolling);
            }
            effects.push(Effect::Notify(match result {
                Ok(()) => Notification::info("Task cancelled", task_id),
                Err(message) => Notification::error("Failed to cancel task", message),
            }));
            effects
        }
        Msg::PollCompleted { ticket, result } => {
            let failure = result.as_ref().err().cloned();
            match state.tracker_mut().apply_poll(&ticket, result) {
                PollOutcome::Stale => Vec::new(),
                PollOutcome::Updated => {
                    state.mark_dirty();
                    Vec::new()
                }
                PollOutcome::Terminal(_) => {
                    state.mark_dirty();
                    vec![Effect::HaltPolling]
                }
                PollOutcome::Failed => {
                    state.mark_dirty();
                    let message = failure.unwrap_or_default();
                    vec![Effect::Notify(Notification::warning(
                        "Task status unavailable",
                        message,
                    ))]
                }
            }
        }
        Msg::InstancesRequested => vec![Effect::FetchInstances],
        Msg::InstancesLoaded(Ok(instances)) => {
            let previous = state.instances().active_id();
            let demoted = state.instances_mut().replace_all(instances);
            state.mark_dirty();
            let active = state.instances().active_id();
            let mut effects = vec![Effect::MirrorActiveInstance { id: active }];
            if active != previous {
                effects.push(Effect::BroadcastInstanceChanged { id: active });
            }
            if demoted > 0 {
                effects.push(Effect::Notify(Notification::warning(
                    "Instances",
                    format!("{} additional instance(s) reported as active were ignored", demoted),
                )));
            }
            effects
        }
        Msg::InstancesLoaded(Err(message)) => vec![Effect::Notify(Notification::error(
            "Could not load instances",
            message,
        ))],
        Msg::ActiveInstanceRequested => vec![Effect::FetchActiveInstance],
        Msg::ActiveInstanceLoaded(Ok(Some(instance))) => {
            let previous = state.instances().active_id();
            publish_active(&mut state, instance, previous)
        }
        Msg::ActiveInstanceLoaded(Ok(None)) => {
            let previous = state.instances().active_id();
            state.instances_mut().clear_active();
            state.mark_dirty();
            let mut effects = vec![Effect::MirrorActiveInstance { id: None }];
            if previous.is_some() {
                effects.push(Effect::BroadcastInstanceChanged { id: None });
            }
            effects
        }
        Msg::ActiveInstanceLoaded(Err(message)) => vec![Effect::Notify(Notification::warning(
            "Could not refresh active instance",
            message,
        ))],
        Msg::ActivateRequested { id } => {
            let instances = state.instances();
            if instances.active_is_confirmed() && instances.active_id() == Some(id) {
                vec![Effect::Notify(Notification::info(
                    "Instance already active",
                    instance_label(state.instances().active(), id),
                ))]
            } else {
                vec![Effect::ActivateInstance { id }]
            }
        }
        Msg::ActivateCompleted {
            id: _,
            result: Ok(instance),
        } => {
            let previous = state.instances().active_id();
            let label = instance.name.clone();
            let mut effects = publish_active(&mut state, instance, previous);
            effects.push(Effect::Notify(Notification::success(
                "Instance activated",
                format!("Now working with: {label}"),
            )));
            effects
        }
        Msg::ActivateCompleted {
            id,
            result: Err(message),
        } => vec![Effect::Notify(Notification::error(
            format!("Could not activate instance {id}"),
            message,
        ))],
        Msg::ForeignActiveChanged { .. } => {
            // The written value is only a signal; the server decides.
            vec![Effect::FetchActiveInstance]
        }
        Msg::RestoreActiveInstance(instance) => {
            if state.instances_mut().restore_active(instance) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::LoggedOut => {
            let mut effects = Vec::with_capacity(2);
            if state.tracker_mut().stop(StopReason::LoggedOut) {
                effects.push(Effect::HaltPolling);
            }
            state.instances_mut().clear();
            state.mark_dirty();
            effects.push(Effect::MirrorActiveInstance { id: None });
            effects
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn publish_active(
    state: &mut AppState,
    instance: Instance,
    previous: Option<InstanceId>,
) -> Vec<Effect> {
    let id = instance.id;
    state.instances_mut().set_active(instance);
    state.mark_dirty();
    let mut effects = vec![Effect::MirrorActiveInstance { id: Some(id) }];
    if previous != Some(id) {
        effects.push(Effect::BroadcastInstanceChanged { id: Some(id) });
    }
    effects
}

fn instance_label(instance: Option<&Instance>, id: InstanceId) -> String {
    match instance {
        Some(instance) if !instance.name.is_empty() => instance.name.clone(),
        _ => format!("instance {id}"),
    }
}
