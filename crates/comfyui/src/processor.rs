//! WebSocket message processing loop.
//!
//! Reads raw frames from a ComfyUI WebSocket connection one at a time,
//! in arrival order. Text frames are parsed into typed
//! [`ComfyUIMessage`](crate::messages::ComfyUIMessage) variants, binary
//! frames are decoded into [`Payload`](crate::frames::Payload)s, and both
//! are handed to the [`JobTracker`].

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::frames::{decode_payload, FrameError};
use crate::messages::parse_message;
use crate::tracker::JobTracker;

/// Why [`process_messages`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server sent a close frame or the stream was exhausted.
    Closed,
    /// A receive error broke the connection.
    Failed,
    /// The cancellation token fired.
    Cancelled,
}

/// Process WebSocket frames until the connection ends.
///
/// Loops until the WebSocket closes, encounters a receive error, the
/// stream is exhausted, or `cancel` fires. Malformed and unknown frames
/// are logged and skipped; they never end the loop.
pub async fn process_messages<S>(
    ws_stream: &mut S,
    tracker: &JobTracker,
    cancel: &CancellationToken,
) -> StreamEnd
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            next = ws_stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(&text, tracker).await;
            }
            Some(Ok(Message::Binary(bytes))) => {
                handle_binary_message(bytes, tracker).await;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "ComfyUI WebSocket closed");
                return StreamEnd::Closed;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "WebSocket receive error");
                return StreamEnd::Failed;
            }
            None => {
                tracing::info!("ComfyUI WebSocket stream ended");
                return StreamEnd::Closed;
            }
        }
    }
}

async fn handle_text_message(text: &str, tracker: &JobTracker) {
    match parse_message(text) {
        Ok(msg) => tracker.handle_message(msg).await,
        Err(e) => {
            // Custom nodes broadcast their own message types.
            tracing::debug!(
                error = %e,
                raw_message = %text,
                "Skipping unrecognised ComfyUI message",
            );
        }
    }
}

async fn handle_binary_message(bytes: Vec<u8>, tracker: &JobTracker) {
    match decode_payload(bytes) {
        Ok(payload) => {
            tracing::debug!(
                kind = payload.kind,
                format = ?payload.format,
                bytes = payload.data.len(),
                "Received binary payload",
            );
            tracker.handle_payload(payload).await;
        }
        Err(FrameError::UnsupportedKind(kind)) => {
            tracing::debug!(kind, "Ignoring non-image binary frame");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed binary frame");
        }
    }
}
