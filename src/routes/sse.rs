// Server-Sent Events stream: one `data:` event per published snapshot.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use tokio::time::Duration;

use super::AppState;
use crate::broadcaster::Subscription;

/// Logs the disconnect; dropping the inner subscription unregisters it.
struct RealtimeGuard(Subscription);

impl Drop for RealtimeGuard {
    fn drop(&mut self) {
        tracing::info!(subscription = %self.0.id(), "Client disconnected from realtime stream");
    }
}

pub(super) async fn realtime(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.broadcaster.subscribe();
    tracing::info!(
        subscription = %subscription.id(),
        subscribers = state.broadcaster.subscriber_count(),
        "Client connected to realtime stream"
    );

    // Ends when the broadcaster drops the subscription (slow client) or the
    // client goes away and axum drops the stream.
    let stream = futures_util::stream::unfold(RealtimeGuard(subscription), |mut guard| async move {
        let snapshot = guard.0.recv().await?;
        let event = Event::default().json_data(snapshot.as_ref());
        if let Err(e) = &event {
            tracing::warn!(error = %e, operation = "encode_snapshot", "snapshot encode failed");
        }
        Some((event, guard))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(state.config.broadcast.keep_alive_secs)),
    )
}
