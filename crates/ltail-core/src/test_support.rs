use crate::channel::Channel;
use crate::connection::{ConnectionId, Transport, TransportError};
use crate::index::FileEntry;
use crate::renderer::LogLine;
use crate::view::{Status, ViewSink};

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub opened: u64,
    pub sent: Vec<String>,
    pub closes: usize,
}

impl RecordingTransport {
    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn open(&mut self) -> Result<ConnectionId, TransportError> {
        self.opened += 1;
        Ok(ConnectionId(self.opened))
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingView {
    pub lines: Vec<LogLine>,
    pub rows: Vec<FileEntry>,
    pub titles: Vec<String>,
    pub scrolls: usize,
    pub channel: Option<Channel>,
    pub mask: String,
    pub status: Option<Status>,
}

impl ViewSink for RecordingView {
    fn append_line(&mut self, line: LogLine) {
        self.lines.push(line);
    }

    fn clear_lines(&mut self) {
        self.lines.clear();
    }

    fn scroll_to_bottom(&mut self) {
        self.scrolls += 1;
    }

    fn upsert_row(&mut self, position: usize, entry: &FileEntry, inserted: bool) {
        if inserted {
            self.rows.insert(position, entry.clone());
        } else {
            self.rows[position] = entry.clone();
        }
    }

    fn remove_row(&mut self, position: usize) {
        self.rows.remove(position);
    }

    fn clear_rows(&mut self) {
        self.rows.clear();
    }

    fn show_channel(&mut self, channel: &Channel) {
        self.channel = Some(channel.clone());
    }

    fn set_title(&mut self, title: &str) {
        self.titles.push(title.to_string());
    }

    fn set_mask(&mut self, pattern: &str) {
        self.mask = pattern.to_string();
    }

    fn set_status(&mut self, status: Option<Status>) {
        self.status = status;
    }
}
