use std::sync::Once;

use pretty_assertions::assert_eq;
use syncdash_core::{
    update, AppState, Effect, Msg, Notification, PollTicket, StopReason, TaskProgress, TaskState,
    TaskStatus, TrackerPhase,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(syncdash_logging::initialize_for_tests);
}

fn start(state: AppState, task_id: &str) -> (AppState, PollTicket) {
    let (state, effects) = update(
        state,
        Msg::StartTracking {
            task_id: task_id.to_string(),
        },
    );
    let ticket = effects
        .into_iter()
        .find_map(|effect| match effect {
            Effect::StartPolling { ticket } => Some(ticket),
            _ => None,
        })
        .expect("start polling effect");
    (state, ticket)
}

fn poll(state: AppState, ticket: &PollTicket, status: TaskStatus) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::PollCompleted {
            ticket: ticket.clone(),
            result: Ok(status),
        },
    )
}

#[test]
fn empty_task_id_is_reported_without_tracking() {
    init_logging();
    let (mut state, effects) = update(
        AppState::new(),
        Msg::StartTracking {
            task_id: "  ".to_string(),
        },
    );

    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::warning(
            "Tracking",
            "No task to track"
        ))]
    );
    assert_eq!(state.view().tracker.phase, TrackerPhase::Untracked);
    assert!(!state.consume_dirty());
}

#[test]
fn start_emits_ticket_for_new_epoch() {
    init_logging();
    let (mut state, ticket) = start(AppState::new(), "task-1");

    assert_eq!(ticket.task_id, "task-1");
    assert_eq!(ticket.epoch, 1);
    assert!(state.tracker().is_current(&ticket));
    assert_eq!(state.view().tracker.phase, TrackerPhase::Polling);
    assert!(state.view().tracker.can_cancel);
    assert!(state.consume_dirty());
}

#[test]
fn responses_replace_snapshot_wholesale() {
    init_logging();
    let (state, ticket) = start(AppState::new(), "task-1");

    let mut progress = TaskStatus::new("task-1", TaskState::Progress);
    progress.progress = Some(TaskProgress {
        current: 3,
        total: 10,
        message: Some("Syncing products".to_string()),
        percentage: None,
    });
    let (state, effects) = poll(state, &ticket, progress.clone());
    assert!(effects.is_empty());
    assert_eq!(state.view().tracker.status, Some(progress));

    let started = TaskStatus::new("task-1", TaskState::Started);
    let (state, _) = poll(state, &ticket, started.clone());
    let status = state.view().tracker.status.expect("status");
    assert_eq!(status, started);
    assert_eq!(status.progress, None);
}

#[test]
fn terminal_response_stops_polling() {
    init_logging();
    for terminal in [TaskState::Success, TaskState::Failure, TaskState::Revoked] {
        let (state, ticket) = start(AppState::new(), "task-1");
        let (state, _) = poll(state, &ticket, TaskStatus::new("task-1", TaskState::Pending));
        let (state, effects) = poll(state, &ticket, TaskStatus::new("task-1", terminal));

        assert_eq!(effects, vec![Effect::HaltPolling]);
        assert_eq!(state.tracker().phase(), TrackerPhase::Stopped);
        assert_eq!(state.tracker().stop_reason(), Some(StopReason::Terminal(terminal)));
        assert!(!state.tracker().is_current(&ticket));
        assert_eq!(state.tracker().current_ticket(), None);

        // A poll that was already scheduled must not be applied.
        let (next, effects) = poll(state.clone(), &ticket, TaskStatus::new("task-1", TaskState::Started));
        assert!(effects.is_empty());
        assert_eq!(next.view().tracker.status, state.view().tracker.status);
    }
}

#[test]
fn failed_poll_keeps_previous_snapshot_and_keeps_polling() {
    init_logging();
    let (state, ticket) = start(AppState::new(), "task-1");
    let (state, _) = poll(state, &ticket, TaskStatus::new("task-1", TaskState::Started));

    let (state, effects) = update(
        state,
        Msg::PollCompleted {
            ticket: ticket.clone(),
            result: Err("http status 502".to_string()),
        },
    );

    assert!(matches!(effects.as_slice(), [Effect::Notify(_)]));
    let view = state.view();
    assert_eq!(view.tracker.phase, TrackerPhase::Polling);
    assert_eq!(view.tracker.last_error.as_deref(), Some("http status 502"));
    assert_eq!(
        view.tracker.status.map(|status| status.state),
        Some(TaskState::Started)
    );
    assert!(state.tracker().is_current(&ticket));

    let (state, _) = poll(state, &ticket, TaskStatus::new("task-1", TaskState::Progress));
    assert_eq!(state.view().tracker.last_error, None);
}

#[test]
fn response_after_stop_is_discarded() {
    init_logging();
    let (state, ticket) = start(AppState::new(), "task-1");
    let (state, effects) = update(state, Msg::StopTracking);
    assert_eq!(effects, vec![Effect::HaltPolling]);

    let (mut state, effects) = poll(state, &ticket, TaskStatus::new("task-1", TaskState::Success));
    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.tracker.status, None);
    assert_eq!(view.tracker.task_id, None);
    assert_eq!(view.tracker.phase, TrackerPhase::Stopped);
    assert!(state.consume_dirty());

    let (mut state, _) = poll(state, &ticket, TaskStatus::new("task-1", TaskState::Started));
    assert!(!state.consume_dirty());
}

#[test]
fn restart_invalidates_previous_epoch() {
    init_logging();
    let (state, first) = start(AppState::new(), "task-1");
    let (state, effects) = update(
        state,
        Msg::StartTracking {
            task_id: "task-2".to_string(),
        },
    );
    let second = match effects.as_slice() {
        [Effect::HaltPolling, Effect::StartPolling { ticket }] => ticket.clone(),
        other => panic!("unexpected effects {other:?}"),
    };
    assert!(second.epoch > first.epoch);

    let (state, _) = poll(state, &first, TaskStatus::new("task-1", TaskState::Success));
    assert_eq!(state.view().tracker.status, None);
    assert_eq!(state.view().tracker.task_id.as_deref(), Some("task-2"));

    let (state, _) = poll(state, &second, TaskStatus::new("task-2", TaskState::Started));
    assert_eq!(
        state.view().tracker.status.map(|status| status.task_id),
        Some("task-2".to_string())
    );
}

#[test]
fn cancel_of_tracked_task_carries_epoch() {
    init_logging();
    let (state, ticket) = start(AppState::new(), "task-1");
    let (state, effects) = update(
        state,
        Msg::CancelRequested {
            task_id: "task-1".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CancelTask {
            task_id: "task-1".to_string(),
            epoch: Some(ticket.epoch),
        }]
    );

    let (_, effects) = update(
        state,
        Msg::CancelRequested {
            task_id: "other".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CancelTask {
            task_id: "other".to_string(),
            epoch: None,
        }]
    );
}

#[test]
fn cancel_stops_polling_even_when_backend_fails() {
    init_logging();
    for result in [Ok(()), Err("http status 500".to_string())] {
        let (state, ticket) = start(AppState::new(), "task-1");
        let (state, _) = poll(state, &ticket, TaskStatus::new("task-1", TaskState::Progress));
        let (state, effects) = update(
            state,
            Msg::CancelFinished {
                task_id: "task-1".to_string(),
                epoch: Some(ticket.epoch),
                result,
            },
        );

        assert_eq!(effects[0], Effect::HaltPolling);
        assert!(matches!(effects[1], Effect::Notify(_)));
        let view = state.view();
        assert_eq!(view.tracker.phase, TrackerPhase::Stopped);
        assert_eq!(view.tracker.stop_reason, Some(StopReason::Cancelled));
        // The last snapshot stays on screen.
        assert_eq!(
            view.tracker.status.map(|status| status.state),
            Some(TaskState::Progress)
        );
        assert!(!view.tracker.can_cancel);
    }
}

#[test]
fn late_cancel_does_not_stop_a_newer_task() {
    init_logging();
    let (state, first) = start(AppState::new(), "task-1");
    let (state, _) = start(state, "task-2");

    let (state, effects) = update(
        state,
        Msg::CancelFinished {
            task_id: "task-1".to_string(),
            epoch: Some(first.epoch),
            result: Ok(()),
        },
    );

    assert!(matches!(effects.as_slice(), [Effect::Notify(_)]));
    assert_eq!(state.view().tracker.phase, TrackerPhase::Polling);
    assert_eq!(state.view().tracker.task_id.as_deref(), Some("task-2"));
}

#[test]
fn stop_then_start_new_id_resumes_polling() {
    init_logging();
    let (state, _) = start(AppState::new(), "task-1");
    let (state, _) = update(state, Msg::StopTracking);
    let (state, ticket) = start(state, "task-2");

    assert_eq!(state.tracker().phase(), TrackerPhase::Polling);
    assert_eq!(ticket.epoch, 3);
}
