//! WebSocket echo client worker.
//!
//! Runs on its own thread with its own runtime so the UI never blocks.
//! Outbound text travels over an unbounded channel into the writer half of
//! the split stream; everything the server sends comes back to the UI as
//! [`StreamEvent`]s through the `emit` callback.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error};

use crate::link::StreamEvent;

/// Connect to `url` and return the sender for outbound text messages.
/// Dropping the sender (or the peer closing) ends the connection; the final
/// event is always `Closed`.
pub fn spawn(url: String, emit: impl Fn(StreamEvent) + Send + 'static) -> mpsc::UnboundedSender<String> {
    let (outbound, mut pending) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to create websocket runtime");
        rt.block_on(async move {
            let (stream, response) = match connect_async(url.as_str()).await {
                Ok(connected) => connected,
                Err(err) => {
                    error!(%url, %err, "websocket connect failed");
                    emit(StreamEvent::Error(err.to_string()));
                    emit(StreamEvent::Closed);
                    return;
                }
            };
            debug!(%url, status = %response.status(), "websocket handshake complete");
            emit(StreamEvent::Opened);

            let (mut write, mut read) = stream.split();

            let writer = tokio::spawn(async move {
                while let Some(text) = pending.recv().await {
                    if let Err(err) = write.send(Message::Text(text.into())).await {
                        error!(%err, "websocket send failed");
                        break;
                    }
                }
            });

            while let Some(next) = read.next().await {
                match next {
                    Ok(Message::Text(text)) => emit(StreamEvent::Message(text.as_str().to_string())),
                    Ok(Message::Close(_)) => break,
                    // Pings and pongs are answered by tungstenite; binary
                    // frames have no place in a text echo panel.
                    Ok(_) => {}
                    Err(err) => {
                        error!(%err, "websocket read failed");
                        emit(StreamEvent::Error(err.to_string()));
                        break;
                    }
                }
            }

            writer.abort();
            emit(StreamEvent::Closed);
        });
    });

    outbound
}
