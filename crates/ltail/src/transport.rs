//! Websocket transport: one pump task per connection attempt, reporting back
//! to the event loop over an mpsc channel.

use futures_util::{SinkExt, StreamExt};
use ltail_core::{ConnectionId, SocketEvent, Transport, TransportError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub id: ConnectionId,
    pub event: SocketEvent,
}

enum Command {
    Send(String),
    Close,
}

struct Session {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

pub struct WsTransport {
    url: Url,
    events: mpsc::Sender<TransportEvent>,
    next_id: u64,
    session: Option<Session>,
}

impl WsTransport {
    pub fn new(url: Url, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            url,
            events,
            next_id: 0,
            session: None,
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self) -> Result<ConnectionId, TransportError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Start(err.to_string()))?;
        if let Some(old) = self.session.take() {
            debug!(event = "pump_superseded", conn = %old.id);
            old.task.abort();
        }
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let url = self.url.clone();
        let events = self.events.clone();
        let task = handle.spawn(async move {
            pump(url, id, command_rx, events).await;
        });
        self.session = Some(Session { id, commands, task });
        Ok(id)
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        session
            .commands
            .send(Command::Send(text))
            .map_err(|_| TransportError::Send(format!("{} pump has stopped", session.id)))
    }

    fn close(&mut self) {
        if let Some(session) = &self.session {
            let _ = session.commands.send(Command::Close);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

async fn pump(
    url: Url,
    id: ConnectionId,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<TransportEvent>,
) {
    let emit = |event| TransportEvent { id, event };
    let mut ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(err) => {
            warn!(event = "ws_connect_error", conn = %id, error = %err);
            let _ = events.send(emit(SocketEvent::Error(err.to_string()))).await;
            let _ = events.send(emit(SocketEvent::Closed)).await;
            return;
        }
    };
    if events.send(emit(SocketEvent::Opened)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = ws.next() => {
                let frame = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(event = "ws_binary_frame", conn = %id, error = %err);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(event = "ws_read_error", conn = %id, error = %err);
                        let _ = events.send(emit(SocketEvent::Error(err.to_string()))).await;
                        break;
                    }
                };
                if events.send(emit(SocketEvent::Message(frame))).await.is_err() {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(err) = ws.send(Message::Text(text)).await {
                        warn!(event = "ws_write_error", conn = %id, error = %err);
                        let _ = events.send(emit(SocketEvent::Error(err.to_string()))).await;
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
    }
    debug!(event = "pump_finished", conn = %id);
    let _ = events.send(emit(SocketEvent::Closed)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn pump_reports_open_frames_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let reply = format!("{{\"type\":\"log\",\"data\":\"got\"}}\n{text}");
                    ws.send(Message::Text(reply)).await.expect("reply");
                }
            }
        });

        let (tx, mut rx) = mpsc::channel(16);
        let url = Url::parse(&format!("ws://{addr}/tail")).expect("url");
        let mut transport = WsTransport::new(url, tx);
        let id = transport.open().expect("open");

        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent {
                id,
                event: SocketEvent::Opened
            }
        );

        transport.send(r#"{"type":"ping"}"#.to_string()).expect("send");
        let echoed = "{\"type\":\"log\",\"data\":\"got\"}\n{\"type\":\"ping\"}";
        assert_eq!(
            next_event(&mut rx).await.event,
            SocketEvent::Message(echoed.to_string())
        );

        transport.close();
        assert_eq!(next_event(&mut rx).await.event, SocketEvent::Closed);
        timeout(Duration::from_secs(5), server)
            .await
            .expect("server done")
            .expect("server task");
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let (tx, mut rx) = mpsc::channel(16);
        let url = Url::parse(&format!("ws://{addr}/tail")).expect("url");
        let mut transport = WsTransport::new(url, tx);
        let id = transport.open().expect("open");

        let first = next_event(&mut rx).await;
        assert_eq!(first.id, id);
        assert!(matches!(first.event, SocketEvent::Error(_)));
        assert_eq!(next_event(&mut rx).await.event, SocketEvent::Closed);
    }

    #[test]
    fn send_without_session_is_not_connected() {
        let (tx, _rx) = mpsc::channel(1);
        let url = Url::parse("ws://127.0.0.1:1/tail").expect("url");
        let mut transport = WsTransport::new(url, tx);
        assert_eq!(
            transport.send("x".to_string()),
            Err(TransportError::NotConnected)
        );
        assert!(matches!(
            transport.open(),
            Err(TransportError::Start(_))
        ));
    }
}
