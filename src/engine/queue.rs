use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Hands a trip to the matching worker without waiting. When the queue is
/// full or closed the trip is left `requested` and the miss is counted as a
/// match attempt.
pub fn enqueue_match(state: &AppState, trip_id: Uuid) -> Result<(), AppError> {
    state.metrics.match_queue_depth.inc();

    let Err(err) = state.match_tx.try_send(trip_id) else {
        return Ok(());
    };

    state.metrics.match_queue_depth.dec();
    let outcome = match err {
        TrySendError::Full(_) => "queue_full",
        TrySendError::Closed(_) => "queue_closed",
    };
    state
        .metrics
        .match_attempts_total
        .with_label_values(&[outcome])
        .inc();
    Err(AppError::Internal(format!(
        "match queue rejected trip {trip_id}: {outcome}"
    )))
}
