//! Async driver - runs a [`Session`] against a live WebSocket
//!
//! One task per session. It owns the socket halves and multiplexes inbound
//! frames, the reconnect timer, operator intents and shutdown in a single
//! `select!` loop. A step that touched the handler publishes a fresh
//! [`SessionView`]; other steps only update the connection state.

use super::{ChannelHandler, Notice, Session};
use crate::transport::ws::{self, WsMessage, WsReader};
use crate::transport::{ConnectionState, Reconnect, TransportError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

/// Upper bound on a single connect handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of a session for rendering
#[derive(Debug, Clone)]
pub struct SessionView<H> {
    pub state: ConnectionState,
    pub channel: H,
}

/// Front-end side of a spawned session
pub struct SessionHandle<H: ChannelHandler> {
    intents: mpsc::UnboundedSender<H::Intent>,
    view: watch::Receiver<SessionView<H>>,
    notices: mpsc::UnboundedReceiver<Notice>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl<H: ChannelHandler> SessionHandle<H> {
    /// Queue an intent for the session task
    pub fn apply(&self, intent: H::Intent) -> Result<(), TransportError> {
        self.intents.send(intent).map_err(|_| TransportError::Closed)
    }

    /// Latest published view
    pub fn view(&self) -> watch::Ref<'_, SessionView<H>> {
        self.view.borrow()
    }

    /// Wait until a new view is published; errors once the task has ended
    pub async fn changed(&mut self) -> Result<(), TransportError> {
        self.view.changed().await.map_err(|_| TransportError::Closed)
    }

    /// Next notice, waiting for one
    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    /// Next notice if one is already waiting
    pub fn try_notice(&mut self) -> Option<Notice> {
        self.notices.try_recv().ok()
    }

    /// Stop the session and wait for its task
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Session task failed: {}", e);
        }
    }
}

/// Spawn a task driving `session` and return its handle.
///
/// The first connect starts immediately regardless of reconnect policy.
pub fn spawn<H>(mut session: Session<H>) -> SessionHandle<H>
where
    H: ChannelHandler + Clone + Send + Sync + 'static,
    H::Intent: Send + 'static,
{
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (view_tx, view_rx) = watch::channel(SessionView {
        state: session.state(),
        channel: session.handler().clone(),
    });

    let span = tracing::info_span!("session", channel = %H::KIND, id = %session.id());
    session.connect();
    let task = tokio::spawn(
        run(session, intent_rx, view_tx, notice_tx, shutdown_rx).instrument(span),
    );

    SessionHandle {
        intents: intent_tx,
        view: view_rx,
        notices: notice_rx,
        shutdown: Some(shutdown_tx),
        task,
    }
}

async fn run<H>(
    mut session: Session<H>,
    mut intents: mpsc::UnboundedReceiver<H::Intent>,
    view: watch::Sender<SessionView<H>>,
    notices: mpsc::UnboundedSender<Notice>,
    mut shutdown: oneshot::Receiver<()>,
) where
    H: ChannelHandler + Clone,
{
    let url = session.transport().endpoint().to_string();
    let mut reader: Option<WsReader> = None;
    let mut retry_at: Option<Instant> = None;
    // The initial view was cloned at spawn
    let mut published = session.revision();

    tracing::debug!("Session started for {}", url);
    publish(&mut session, &view, &notices, &mut published);

    loop {
        if session.state() == ConnectionState::Connecting && reader.is_none() {
            let attempt = tokio::select! {
                result = tokio::time::timeout(CONNECT_TIMEOUT, ws::connect(&url)) => {
                    result.unwrap_or_else(|_| {
                        Err(TransportError::ConnectFailed("handshake timed out".to_string()))
                    })
                }
                _ = &mut shutdown => break,
            };

            match attempt {
                Ok((writer, stream)) => {
                    let (sink, _writer_task) = ws::spawn_writer(writer);
                    session.on_open(Box::new(sink));
                    reader = Some(stream);
                }
                Err(e) => retry_at = deadline(session.on_error(&e)),
            }
            publish(&mut session, &view, &notices, &mut published);
            continue;
        }

        tokio::select! {
            frame = next_frame(&mut reader) => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        session.on_frame(&text);
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        session.on_frame_bytes(&data);
                    }
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        tracing::info!("Server closed the connection ({}): {}", code, reason);
                        reader = None;
                        retry_at = deadline(session.on_close());
                    }
                    Some(Err(e)) => {
                        reader = None;
                        retry_at = deadline(session.on_error(&e));
                    }
                    None => {
                        reader = None;
                        retry_at = deadline(session.on_close());
                    }
                }
            }
            _ = wait_until(retry_at) => {
                retry_at = None;
                session.connect();
            }
            intent = intents.recv() => {
                match intent {
                    Some(intent) => {
                        let _ = session.apply(intent);
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => break,
        }
        publish(&mut session, &view, &notices, &mut published);
    }

    session.close();
    publish(&mut session, &view, &notices, &mut published);
    tracing::debug!("Session stopped");
}

/// Forward notices and publish the view.
///
/// The handler is cloned only when its revision moved past `published`.
/// Otherwise watchers are still woken when the state changed or notices
/// are waiting.
fn publish<H: ChannelHandler + Clone>(
    session: &mut Session<H>,
    view: &watch::Sender<SessionView<H>>,
    notices: &mpsc::UnboundedSender<Notice>,
    published: &mut u64,
) {
    let pending = session.take_notices();
    let has_notices = !pending.is_empty();
    for notice in pending {
        let _ = notices.send(notice);
    }

    let state = session.state();
    if session.revision() != *published {
        *published = session.revision();
        view.send_replace(SessionView {
            state,
            channel: session.handler().clone(),
        });
    } else {
        let stale = view.borrow().state != state;
        if stale || has_notices {
            view.send_modify(|current| current.state = state);
        }
    }
}

fn deadline(decision: Reconnect) -> Option<Instant> {
    match decision {
        Reconnect::After(delay) => Some(Instant::now() + delay),
        Reconnect::Idle | Reconnect::GiveUp { .. } => None,
    }
}

async fn next_frame(reader: &mut Option<WsReader>) -> Option<Result<WsMessage, TransportError>> {
    match reader {
        Some(reader) => reader.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TargetMultiplexer;
    use crate::transport::{BackoffConfig, ReconnectPolicy};

    #[test]
    fn test_publish_skips_untouched_handler() {
        let mut session = Session::new(
            TargetMultiplexer::new(),
            "ws://localhost:9000/telnet",
            ReconnectPolicy::Eager(BackoffConfig::default()),
        );
        let (view_tx, mut view_rx) = watch::channel(SessionView {
            state: session.state(),
            channel: session.handler().clone(),
        });
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let mut published = session.revision();

        session.on_frame(r#"{"type":"somethingNew"}"#);
        publish(&mut session, &view_tx, &notice_tx, &mut published);
        assert!(!view_rx.has_changed().unwrap());

        session.on_frame(r#"{"type":"servers","data":["a"]}"#);
        publish(&mut session, &view_tx, &notice_tx, &mut published);
        assert!(view_rx.has_changed().unwrap());
        assert_eq!(view_rx.borrow_and_update().channel.active(), Some("a"));

        // State-only change: no new handler snapshot, watchers still woken
        session.connect();
        publish(&mut session, &view_tx, &notice_tx, &mut published);
        assert_eq!(published, session.revision());
        assert!(view_rx.has_changed().unwrap());
        assert_eq!(view_rx.borrow_and_update().state, ConnectionState::Connecting);
        assert_eq!(
            notice_rx.try_recv().unwrap(),
            Notice::Connection(ConnectionState::Connecting)
        );
    }
}
