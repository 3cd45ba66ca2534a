use std::sync::Arc;
use std::time::Duration;

use syncdash_core::{Msg, PollTicket};
use syncdash_logging::{sync_debug, sync_trace};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::SyncApi;

/// Polls one task until `token` is cancelled, the task reaches a terminal
/// state, or the dashboard stops listening.
///
/// The first poll fires immediately. Each request is awaited before the next
/// tick, so at most one request per ticket is ever in flight. A request that
/// is already running when the token fires still reports back; the tracker
/// discards it by epoch.
pub(crate) async fn run_poll_loop(
    api: Arc<dyn SyncApi>,
    ticket: PollTicket,
    interval: Duration,
    token: CancellationToken,
    msg_tx: mpsc::UnboundedSender<Msg>,
) {
    sync_debug!(
        "Polling task {} (epoch {}) every {:?}",
        ticket.task_id,
        ticket.epoch,
        interval
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = api.task_status(&ticket.task_id).await;
        let terminal = matches!(&result, Ok(status) if status.state.is_terminal());
        sync_trace!(
            "Poll result for {} (epoch {}): {:?}",
            ticket.task_id,
            ticket.epoch,
            result.as_ref().map(|status| status.state)
        );

        let msg = Msg::PollCompleted {
            ticket: ticket.clone(),
            result: result.map_err(|err| err.to_string()),
        };
        if msg_tx.send(msg).is_err() || terminal {
            break;
        }
    }
    sync_debug!("Poll loop for {} (epoch {}) finished", ticket.task_id, ticket.epoch);
}
