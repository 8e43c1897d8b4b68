//! The client context: owns every component plus the transport and view, and
//! is the single entry point for socket, user and timer events.

use crate::channel::{AckOutcome, Channel, ChannelMultiplexer};
use crate::connection::{
    ConnectionId, ConnectionManager, Link, SendError, SocketEvent, Transport, DEFAULT_KEEPALIVE,
};
use crate::index::{IndexChange, IndexModel};
use crate::navigation::{Location, NavigationController};
use crate::protocol::{FrameDecoder, Inbound, Outbound, DEFAULT_MAX_RECORD_BYTES};
use crate::renderer::{LogRenderer, DEFAULT_SCROLL_DEBOUNCE};
use crate::timer::earliest;
use crate::view::{Status, ViewSink};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Keepalive period and reconnect delay.
    pub keepalive: Duration,
    pub scroll_debounce: Duration,
    pub max_record_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keepalive: DEFAULT_KEEPALIVE,
            scroll_debounce: DEFAULT_SCROLL_DEBOUNCE,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub host: Option<String>,
    pub last_server_error: Option<String>,
    pub last_stats: Option<Value>,
    pub last_pong: Option<Instant>,
    pub decode_failures: u64,
    pub unknown_records: u64,
    pub stale_acks: u64,
    pub discarded_lines: u64,
}

pub struct Client<T, V> {
    connection: ConnectionManager,
    channels: ChannelMultiplexer,
    navigation: NavigationController,
    index: IndexModel,
    renderer: LogRenderer,
    decoder: FrameDecoder,
    diagnostics: Diagnostics,
    trace: bool,
    transport: T,
    view: V,
}

impl<T: Transport, V: ViewSink> Client<T, V> {
    pub fn new(config: ClientConfig, initial: Location, transport: T, view: V) -> Self {
        Self {
            connection: ConnectionManager::new(config.keepalive),
            channels: ChannelMultiplexer::new(),
            navigation: NavigationController::new(initial),
            index: IndexModel::new(),
            renderer: LogRenderer::new(config.scroll_debounce),
            decoder: FrameDecoder::new(config.max_record_bytes),
            diagnostics: Diagnostics::default(),
            trace: false,
            transport,
            view,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn channels(&self) -> &ChannelMultiplexer {
        &self.channels
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.navigation
    }

    pub fn index(&self) -> &IndexModel {
        &self.index
    }

    pub fn renderer(&self) -> &LogRenderer {
        &self.renderer
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Shows the initial location and starts the first connection attempt.
    pub fn start(&mut self, now: Instant) {
        let location = self.navigation.current().clone();
        self.renderer.reset(location.channel().clone(), &mut self.view);
        self.renderer.set_mask(location.mask().unwrap_or(""), &mut self.view);
        self.connect(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.connection.next_deadline(), self.renderer.next_deadline()])
    }

    pub fn poll_timers(&mut self, now: Instant) {
        let attempts = self.connection.attempts();
        self.connection.poll(now, &mut self.transport);
        if self.connection.attempts() != attempts {
            self.show_connect_status();
        }
        self.renderer.poll(now, &mut self.view);
    }

    pub fn handle_socket(&mut self, now: Instant, id: ConnectionId, event: SocketEvent) {
        if !self.connection.accepts(id) {
            debug!(event = "stale_socket_event", conn = %id);
            return;
        }
        match event {
            SocketEvent::Opened => self.on_open(now),
            SocketEvent::Message(frame) => self.handle_frame(now, &frame),
            SocketEvent::Closed => {
                if self.connection.on_close(now) {
                    let status = match self.connection.last_error() {
                        Some(err) => Status::TransportError(err.to_string()),
                        None => Status::Closed,
                    };
                    self.view.set_status(Some(status));
                }
            }
            SocketEvent::Error(message) => {
                self.view.set_status(Some(Status::TransportError(message.clone())));
                self.connection.on_error(message);
            }
        }
    }

    pub fn handle_frame(&mut self, now: Instant, frame: &str) {
        let report = self.decoder.decode(frame);
        for err in &report.errors {
            if err.is_soft() {
                self.diagnostics.unknown_records += 1;
                warn!(event = "unknown_record", error = %err);
            } else {
                self.diagnostics.decode_failures += 1;
                warn!(event = "record_decode", error = %err);
            }
        }
        for record in report.records {
            self.handle_record(now, record);
        }
    }

    pub fn handle_record(&mut self, now: Instant, record: Inbound) {
        match record {
            Inbound::Index { data } => {
                let name = data.name.clone();
                match self.index.apply(data) {
                    IndexChange::Upserted { position, inserted } => {
                        if let Some(entry) = self.index.get(&name) {
                            self.view.upsert_row(position, entry, inserted);
                        }
                    }
                    IndexChange::Removed { position } => self.view.remove_row(position),
                    IndexChange::Unchanged => {}
                }
            }
            Inbound::Attach { channel } => self.on_attach_ack(now, channel),
            Inbound::Detach { channel } => {
                self.channels.on_detach_ack(&channel);
            }
            Inbound::Log { data } => {
                // log records name no channel, so lines sent before the server
                // handles a compensating detach still pass this check
                let current = self.renderer.channel();
                if current.is_index() || self.channels.attached() != Some(current) {
                    self.diagnostics.discarded_lines += 1;
                    debug!(event = "log_discarded", attached = ?self.channels.attached());
                    return;
                }
                self.renderer.append_line(now, data, &mut self.view);
            }
            Inbound::Error { data, channel } => {
                warn!(event = "server_error", error = %data, channel = ?channel);
                self.view.set_status(Some(Status::ServerError(data.clone())));
                self.diagnostics.last_server_error = Some(data);
            }
            Inbound::Stats { data } => {
                self.view.set_status(Some(Status::Stats(summarize_stats(&data))));
                self.diagnostics.last_stats = Some(data);
            }
            Inbound::Pong => self.diagnostics.last_pong = Some(now),
            Inbound::Host { data } => {
                info!(event = "server_host", host = %data);
                self.diagnostics.host = Some(data.clone());
                self.renderer.set_host(data, &mut self.view);
            }
        }
    }

    pub fn navigate(&mut self, now: Instant, location: Location) -> bool {
        if !self.navigation.push(location) {
            return false;
        }
        self.sync(now);
        true
    }

    /// Opens a file from the index; empty and unknown files are refused.
    pub fn open_file(&mut self, now: Instant, name: &str) -> bool {
        match self.index.get(name) {
            Some(entry) if entry.is_navigable() => self.navigate(now, Location::file(name)),
            _ => false,
        }
    }

    pub fn back(&mut self, now: Instant) -> bool {
        if !self.navigation.back() {
            return false;
        }
        self.sync(now);
        true
    }

    pub fn forward(&mut self, now: Instant) -> bool {
        if !self.navigation.forward() {
            return false;
        }
        self.sync(now);
        true
    }

    pub fn set_mask(&mut self, pattern: &str) {
        self.navigation.set_mask(pattern);
        self.renderer.set_mask(pattern, &mut self.view);
    }

    pub fn set_focus(&mut self, focused: bool) {
        self.renderer.set_focus(focused, &mut self.view);
    }

    pub fn on_user_scroll(&mut self, offset: usize, max_offset: usize) {
        self.renderer.on_user_scroll(offset, max_offset);
    }

    /// Drops the current connection; the reconnect timer brings it back.
    pub fn reconnect(&mut self) -> bool {
        let closing = self.connection.close(&mut self.transport);
        if closing {
            info!(event = "reconnect_requested");
        }
        closing
    }

    pub fn request_stats(&mut self, now: Instant) -> Result<(), SendError> {
        self.send(now, &Outbound::Stats)
    }

    pub fn set_trace(&mut self, now: Instant, enabled: bool) -> Result<(), SendError> {
        self.send(now, &Outbound::trace(enabled))?;
        self.trace = enabled;
        Ok(())
    }

    fn send(&mut self, now: Instant, record: &Outbound) -> Result<(), SendError> {
        self.connection.send(now, &mut self.transport, record)
    }

    fn connect(&mut self, now: Instant) {
        self.connection.connect(now, &mut self.transport);
        self.show_connect_status();
    }

    fn show_connect_status(&mut self) {
        let status = if self.connection.current().is_some() {
            Status::Connecting
        } else {
            let error = self.connection.last_error().unwrap_or("connect failed");
            Status::TransportError(error.to_string())
        };
        self.view.set_status(Some(status));
    }

    fn on_open(&mut self, now: Instant) {
        if !self.connection.on_open(now) {
            return;
        }
        self.channels.reset();
        self.view.set_status(None);
        self.sync(now);
        if self.diagnostics.host.is_none() {
            if let Err(err) = self.send(now, &Outbound::Host) {
                debug!(event = "host_request_failed", error = %err);
            }
        }
    }

    fn on_attach_ack(&mut self, now: Instant, channel: Channel) {
        match self.channels.on_attach_ack(channel.clone()) {
            AckOutcome::Recorded if channel.is_index() => {
                // the listing is replayed in full after an index attach
                self.index.clear();
                self.view.clear_rows();
            }
            AckOutcome::Stale => {
                self.diagnostics.stale_acks += 1;
                let mut link = Link::new(&mut self.connection, &mut self.transport);
                if let Err(err) = self.channels.detach(now, channel, &mut link) {
                    debug!(event = "stale_detach_failed", error = %err);
                }
            }
            _ => {}
        }
    }

    fn sync(&mut self, now: Instant) {
        let mut link = Link::new(&mut self.connection, &mut self.transport);
        self.navigation.sync(
            now,
            &mut self.channels,
            &mut link,
            &mut self.renderer,
            &mut self.view,
        );
    }
}

/// One-line rendition of a stats record for the status line.
fn summarize_stats(data: &Value) -> String {
    match data {
        Value::Object(map) if map.is_empty() => "no subscriptions".to_string(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{}={value}", if key.is_empty() { "index" } else { key }))
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingTransport, RecordingView};

    type TestClient = Client<RecordingTransport, RecordingView>;

    fn open_client(now: Instant, initial: Location) -> TestClient {
        let mut client = Client::new(
            ClientConfig::default(),
            initial,
            RecordingTransport::default(),
            RecordingView::default(),
        );
        client.start(now);
        let id = client.connection().current().expect("connecting");
        client.handle_socket(now, id, SocketEvent::Opened);
        client
    }

    #[test]
    fn open_attaches_location_and_requests_host() {
        let now = Instant::now();
        let mut client = open_client(now, Location::file("app.log"));
        assert_eq!(
            client.transport_mut().take_sent(),
            vec![
                r#"{"type":"attach","channel":"app.log"}"#.to_string(),
                r#"{"type":"host"}"#.to_string(),
            ]
        );
        assert_eq!(client.view().status, None);
    }

    #[test]
    fn host_is_requested_only_while_unknown() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        client.handle_frame(now, r#"{"type":"host","data":"srv"}"#);
        client.transport_mut().take_sent();

        let id = client.connection().current().expect("open");
        client.handle_socket(now, id, SocketEvent::Closed);
        client.poll_timers(now + DEFAULT_KEEPALIVE);
        let id = client.connection().current().expect("reconnecting");
        client.handle_socket(now + DEFAULT_KEEPALIVE, id, SocketEvent::Opened);

        assert_eq!(
            client.transport_mut().take_sent(),
            vec![r#"{"type":"attach"}"#.to_string()]
        );
        assert_eq!(client.view().titles.last().map(String::as_str), Some("srv: index"));
    }

    #[test]
    fn stale_attach_ack_is_detached() {
        let now = Instant::now();
        let mut client = open_client(now, Location::file("a.log"));
        client.navigate(now, Location::file("b.log"));
        client.transport_mut().take_sent();

        client.handle_frame(now, r#"{"type":"attach","channel":"a.log"}"#);
        assert_eq!(client.channels().attached(), None);
        assert_eq!(
            client.transport_mut().take_sent(),
            vec![r#"{"type":"detach","channel":"a.log"}"#.to_string()]
        );

        client.handle_frame(now, r#"{"type":"attach","channel":"b.log"}"#);
        assert_eq!(client.channels().attached(), Some(&Channel::file("b.log")));
        assert_eq!(client.diagnostics().stale_acks, 1);
    }

    #[test]
    fn lines_for_unattached_channel_are_discarded() {
        let now = Instant::now();
        let mut client = open_client(now, Location::file("a.log"));
        client.handle_frame(now, r#"{"type":"log","data":"early"}"#);
        client.handle_frame(
            now,
            "{\"type\":\"attach\",\"channel\":\"a.log\"}\n{\"type\":\"log\",\"data\":\"ok\"}",
        );

        let texts: Vec<_> = client.view().lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["ok"]);
        assert_eq!(client.diagnostics().discarded_lines, 1);
    }

    #[test]
    fn lines_after_new_ack_render_under_new_channel() {
        let now = Instant::now();
        let mut client = open_client(now, Location::file("a.log"));
        client.navigate(now, Location::file("b.log"));
        client.handle_frame(
            now,
            concat!(
                "{\"type\":\"attach\",\"channel\":\"a.log\"}\n",
                "{\"type\":\"attach\",\"channel\":\"b.log\"}\n",
                "{\"type\":\"log\",\"data\":\"from a before detach\"}",
            ),
        );

        let texts: Vec<_> = client.view().lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["from a before detach"]);
        assert_eq!(client.diagnostics().discarded_lines, 0);
    }

    #[test]
    fn index_attach_ack_clears_rows_before_replay() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        client.handle_frame(
            now,
            r#"{"type":"index","data":{"name":"gone.log","size":1,"mtime":"/Date(0)/"}}"#,
        );
        client.handle_frame(
            now,
            concat!(
                "{\"type\":\"attach\"}\n",
                "{\"type\":\"index\",\"data\":{\"name\":\"b.log\",\"size\":1,\"mtime\":\"/Date(0)/\"}}\n",
                "{\"type\":\"index\",\"data\":{\"name\":\"a.log\",\"size\":1,\"mtime\":\"/Date(0)/\"}}\n",
            ),
        );

        let rows: Vec<_> = client.view().rows.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(rows, vec!["a.log", "b.log"]);
        assert_eq!(client.index().len(), 2);
    }

    #[test]
    fn server_error_and_stats_reach_status() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        client.handle_frame(now, r#"{"type":"error","data":"no such file","channel":"x.log"}"#);
        assert_eq!(
            client.view().status,
            Some(Status::ServerError("no such file".to_string()))
        );
        assert_eq!(
            client.diagnostics().last_server_error.as_deref(),
            Some("no such file")
        );

        client.handle_frame(now, r#"{"type":"stats","data":{"":1,"app.log":2}}"#);
        assert_eq!(
            client.view().status,
            Some(Status::Stats("index=1 app.log=2".to_string()))
        );
    }

    #[test]
    fn decode_failures_are_counted() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        client.handle_frame(now, "{\"type\":\"list\"}\nnot json\n{\"type\":\"pong\"}");
        assert_eq!(client.diagnostics().unknown_records, 1);
        assert_eq!(client.diagnostics().decode_failures, 1);
        assert_eq!(client.diagnostics().last_pong, Some(now));
    }

    #[test]
    fn events_from_superseded_connection_are_ignored() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        let old = client.connection().current().expect("open");
        assert!(client.reconnect());
        client.handle_socket(now, old, SocketEvent::Closed);
        client.poll_timers(now + DEFAULT_KEEPALIVE);
        assert_ne!(client.connection().current(), Some(old));

        let late = r#"{"type":"host","data":"x"}"#.to_string();
        client.handle_socket(now, old, SocketEvent::Message(late));
        assert_eq!(client.diagnostics().host, None);
        assert_eq!(client.view().status, Some(Status::Connecting));
    }

    #[test]
    fn trace_and_stats_need_open_connection() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        client.transport_mut().take_sent();

        client.set_trace(now, true).expect("trace");
        client.request_stats(now).expect("stats");
        assert!(client.trace_enabled());
        assert_eq!(
            client.transport_mut().take_sent(),
            vec![
                r#"{"type":"trace","channel":"on"}"#.to_string(),
                r#"{"type":"stats"}"#.to_string(),
            ]
        );

        let id = client.connection().current().expect("open");
        client.handle_socket(now, id, SocketEvent::Closed);
        assert!(client.set_trace(now, false).is_err());
        assert!(client.trace_enabled());
    }

    #[test]
    fn open_file_refuses_empty_entries() {
        let now = Instant::now();
        let mut client = open_client(now, Location::index());
        client.handle_frame(
            now,
            r#"{"type":"index","data":{"name":"empty.log","size":0,"mtime":"/Date(0)/"}}"#,
        );
        assert!(!client.open_file(now, "empty.log"));
        assert!(!client.open_file(now, "missing.log"));
        assert_eq!(client.navigation().current(), &Location::index());
    }
}
