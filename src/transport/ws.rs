//! WebSocket plumbing on top of `tokio-tungstenite`
//!
//! Provides split reader/writer halves and the writer task that drains a
//! session's outbound queue into the socket.

use super::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Inbound frame after control-frame filtering
#[derive(Debug)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Write half of a WebSocket connection
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, Message>,
}

impl WsWriter {
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await.map_err(|_| TransportError::Closed)
    }
}

/// Read half of a WebSocket connection
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next data or close frame; `None` once the stream ends.
    ///
    /// Ping/pong and raw frames are handled by tungstenite and skipped here.
    pub async fn recv(&mut self) -> Option<Result<WsMessage, TransportError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(WsMessage::Text(text))),
                Some(Ok(Message::Binary(data))) => return Some(Ok(WsMessage::Binary(data))),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return Some(Err(TransportError::ReadFailed(e.to_string()))),
                None => return None,
            }
        }
    }
}

/// Open a WebSocket to `url` and split it
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader), TransportError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    let (sink, stream) = stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Spawn the task that writes queued frames to the socket.
///
/// The returned sender is the session's [`FrameSink`](super::FrameSink);
/// dropping it closes the socket's write half.
pub fn spawn_writer(mut writer: WsWriter) -> (mpsc::UnboundedSender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.send_text(frame).await {
                tracing::error!("Failed to write frame: {}", e);
                break;
            }
        }
        let _ = writer.close().await;
        tracing::debug!("Writer task finished");
    });
    (tx, handle)
}
