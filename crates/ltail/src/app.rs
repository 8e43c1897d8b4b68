use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ltail_core::{
    Channel, Client, ConnectionState, FileEntry, Location, LogLine, Mask, Status, Transport,
    ViewSink,
};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

/// Terminal-side presentation state, driven by the client through `ViewSink`.
pub struct TerminalView {
    lines: VecDeque<LogLine>,
    max_lines: usize,
    rows: Vec<FileEntry>,
    selected: usize,
    channel: Channel,
    mask: Mask,
    status: Option<Status>,
    title: String,
    pending_title: Option<String>,
    scroll: usize,
    viewport: usize,
}

impl TerminalView {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            rows: Vec::new(),
            selected: 0,
            channel: Channel::Index,
            mask: Mask::default(),
            status: None,
            title: String::new(),
            pending_title: None,
            scroll: 0,
            viewport: 1,
        }
    }

    pub fn lines(&self) -> &VecDeque<LogLine> {
        &self.lines
    }

    pub fn visible_lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter().skip(self.scroll).take(self.viewport)
    }

    pub fn rows(&self) -> &[FileEntry] {
        &self.rows
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_entry(&self) -> Option<&FileEntry> {
        self.rows.get(self.selected)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title set since the last call, for writing to the terminal.
    pub fn take_title(&mut self) -> Option<String> {
        self.pending_title.take()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    pub fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(self.viewport)
    }

    pub fn viewport(&self) -> usize {
        self.viewport
    }

    /// Called on every draw. Only resizes and clamps; new lines are brought
    /// into view by the debounced `scroll_to_bottom`.
    pub fn set_viewport(&mut self, height: usize) {
        let at_bottom = self.scroll >= self.max_offset();
        self.viewport = height.max(1);
        self.scroll = if at_bottom {
            self.max_offset()
        } else {
            self.scroll.min(self.max_offset())
        };
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let target = if delta < 0 {
            self.scroll.saturating_sub(delta.unsigned_abs())
        } else {
            self.scroll.saturating_add(delta as usize)
        };
        self.scroll = target.min(self.max_offset());
    }

    pub fn scroll_to(&mut self, offset: usize) {
        self.scroll = offset.min(self.max_offset());
    }

    pub fn select_by(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.rows.len() - 1;
        self.selected = if delta < 0 {
            self.selected.saturating_sub(delta.unsigned_abs())
        } else {
            self.selected.saturating_add(delta as usize).min(last)
        };
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.rows.len().saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }
}

impl ViewSink for TerminalView {
    fn append_line(&mut self, line: LogLine) {
        self.lines.push_back(line);
        if self.lines.len() > self.max_lines {
            self.lines.pop_front();
            self.scroll = self.scroll.saturating_sub(1);
        }
    }

    fn clear_lines(&mut self) {
        self.lines.clear();
        self.scroll = 0;
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_offset();
    }

    fn upsert_row(&mut self, position: usize, entry: &FileEntry, inserted: bool) {
        if !inserted {
            if let Some(row) = self.rows.get_mut(position) {
                *row = entry.clone();
                return;
            }
        }
        let position = position.min(self.rows.len());
        // keep the cursor on the same file when rows shift below it
        if !self.rows.is_empty() && position <= self.selected {
            self.selected += 1;
        }
        self.rows.insert(position, entry.clone());
        self.clamp_selection();
    }

    fn remove_row(&mut self, position: usize) {
        if position >= self.rows.len() {
            return;
        }
        self.rows.remove(position);
        if position < self.selected {
            self.selected -= 1;
        }
        self.clamp_selection();
    }

    fn clear_rows(&mut self) {
        self.rows.clear();
        self.selected = 0;
    }

    fn show_channel(&mut self, channel: &Channel) {
        self.channel = channel.clone();
        self.scroll = 0;
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.pending_title = Some(self.title.clone());
    }

    fn set_mask(&mut self, pattern: &str) {
        self.mask = Mask::new(pattern);
    }

    fn set_status(&mut self, status: Option<Status>) {
        self.status = status;
    }
}

/// Snapshot of client state for the header line.
pub struct HeaderInfo {
    pub state: ConnectionState,
    pub location: String,
    pub host: Option<String>,
    pub follow: bool,
    pub unread: u64,
    pub trace: bool,
    pub dropped: u64,
    pub decode_failures: u64,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

impl HeaderInfo {
    pub fn from_client<T: Transport>(client: &Client<T, TerminalView>) -> Self {
        let diagnostics = client.diagnostics();
        Self {
            state: client.connection().state(),
            location: client.navigation().current().to_string(),
            host: diagnostics.host.clone(),
            follow: client.renderer().follows(),
            unread: client.renderer().unread(),
            trace: client.trace_enabled(),
            dropped: client.connection().dropped(),
            decode_failures: diagnostics.decode_failures + diagnostics.unknown_records,
            can_go_back: client.navigation().can_go_back(),
            can_go_forward: client.navigation().can_go_forward(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    EditMask(String),
}

#[derive(Debug, Default)]
pub struct App {
    pub mode: InputMode,
    quit: bool,
}

impl App {
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn handle_event<T: Transport>(
        &mut self,
        client: &mut Client<T, TerminalView>,
        event: Event,
        now: Instant,
    ) {
        match event {
            Event::Key(key) if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) => {
                self.handle_key(client, key, now);
            }
            Event::FocusGained => client.set_focus(true),
            Event::FocusLost => client.set_focus(false),
            _ => {}
        }
    }

    pub fn handle_key<T: Transport>(
        &mut self,
        client: &mut Client<T, TerminalView>,
        key: KeyEvent,
        now: Instant,
    ) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        if let InputMode::EditMask(buffer) = &mut self.mode {
            match key.code {
                KeyCode::Enter => {
                    let pattern = std::mem::take(buffer);
                    self.mode = InputMode::Normal;
                    client.set_mask(&pattern);
                }
                KeyCode::Esc => self.mode = InputMode::Normal,
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(ch) => buffer.push(ch),
                _ => {}
            }
            return;
        }

        let on_index = client.view().channel().is_index();
        match key.code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Char('/') => {
                let current = client.view().mask().pattern().to_string();
                self.mode = InputMode::EditMask(current);
            }
            KeyCode::Char('[') => {
                client.back(now);
            }
            KeyCode::Char(']') => {
                client.forward(now);
            }
            KeyCode::Char('R') => {
                client.reconnect();
            }
            KeyCode::Char('s') => {
                if let Err(err) = client.request_stats(now) {
                    debug!(event = "stats_request_failed", error = %err);
                    client
                        .view_mut()
                        .set_status(Some(Status::TransportError(err.to_string())));
                }
            }
            KeyCode::Char('t') => {
                let enabled = !client.trace_enabled();
                if let Err(err) = client.set_trace(now, enabled) {
                    debug!(event = "trace_toggle_failed", error = %err);
                    client
                        .view_mut()
                        .set_status(Some(Status::TransportError(err.to_string())));
                }
            }
            KeyCode::Enter if on_index => {
                if let Some(name) = client.view().selected_entry().map(|e| e.name.clone()) {
                    client.open_file(now, &name);
                }
            }
            KeyCode::Esc | KeyCode::Backspace if !on_index => {
                client.navigate(now, Location::index());
            }
            KeyCode::Up => step(client, on_index, -1),
            KeyCode::Down => step(client, on_index, 1),
            KeyCode::PageUp => {
                let page = client.view().viewport() as isize;
                step(client, on_index, -page);
            }
            KeyCode::PageDown => {
                let page = client.view().viewport() as isize;
                step(client, on_index, page);
            }
            KeyCode::Home => {
                if on_index {
                    client.view_mut().select_first();
                } else {
                    client.view_mut().scroll_to(0);
                    report_scroll(client);
                }
            }
            KeyCode::End => {
                if on_index {
                    client.view_mut().select_last();
                } else {
                    let bottom = client.view().max_offset();
                    client.view_mut().scroll_to(bottom);
                    report_scroll(client);
                }
            }
            _ => {}
        }
    }
}

fn step<T: Transport>(client: &mut Client<T, TerminalView>, on_index: bool, delta: isize) {
    if on_index {
        client.view_mut().select_by(delta);
    } else {
        client.view_mut().scroll_by(delta);
        report_scroll(client);
    }
}

fn report_scroll<T: Transport>(client: &mut Client<T, TerminalView>) {
    let view = client.view();
    let (offset, max_offset) = (view.scroll_offset(), view.max_offset());
    client.on_user_scroll(offset, max_offset);
}
