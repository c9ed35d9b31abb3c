//! Hot-reload HTTP surface: the WebSocket endpoint and the trigger.

use std::fmt::Display;

use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::registry::{OUTBOUND_QUEUE_CAPACITY, ReloadRegistry};
use crate::models::ReloadResponse;
use crate::utils::ClientAddr;

/// `GET /__hotreload` - upgrade to a WebSocket that receives `"reload"`.
pub async fn hot_reload_socket(
    ws: WebSocketUpgrade,
    State(registry): State<ReloadRegistry>,
    ClientAddr(remote): ClientAddr,
) -> Response {
    ws.on_upgrade(move |socket| {
        let (sink, stream) = socket.split();
        serve_connection(sink, stream, registry, remote)
    })
}

/// `POST /__hotreload_trigger` - tell every connected client to reload.
#[instrument(skip(registry))]
pub async fn trigger_reload(State(registry): State<ReloadRegistry>) -> Json<ReloadResponse> {
    let delivered = registry.notify();
    Json(ReloadResponse { delivered })
}

/// Drive one connection until the client goes away or a write fails.
///
/// A writer task drains the connection's queue into the sink while this
/// task reads frames only to notice disconnects. A failed write cancels the
/// read loop, and the registration guard removes the connection however
/// this function exits.
async fn serve_connection<W, R, E>(
    mut sink: W,
    mut stream: R,
    registry: ReloadRegistry,
    remote: String,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    let (outbound, mut queue) = mpsc::channel::<&'static str>(OUTBOUND_QUEUE_CAPACITY);
    let registration = registry.register(remote, outbound);
    let connection_id = registration.id();
    let write_failed = CancellationToken::new();

    let writer = {
        let write_failed = write_failed.clone();
        tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                if let Err(e) = sink.send(Message::Text(message.into())).await {
                    debug!(connection_id, error = %e, "Hot-reload write failed");
                    write_failed.cancel();
                    return;
                }
            }
            let _ = sink.close().await;
        })
    };

    loop {
        tokio::select! {
            () = write_failed.cancelled() => break,
            frame = stream.next() => match frame {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id, error = %e, "Hot-reload read failed");
                    break;
                }
            },
        }
    }

    writer.abort();
    drop(registration);
}
