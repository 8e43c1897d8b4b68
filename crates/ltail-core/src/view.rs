use crate::channel::Channel;
use crate::index::FileEntry;
use crate::renderer::LogLine;

/// Transient condition shown next to the content, replaced by the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Connecting,
    Closed,
    TransportError(String),
    ServerError(String),
    Stats(String),
}

impl Status {
    pub fn text(&self) -> String {
        match self {
            Status::Connecting => "connecting".to_string(),
            Status::Closed => "connection closed".to_string(),
            Status::TransportError(msg) => format!("transport error: {msg}"),
            Status::ServerError(msg) => format!("server error: {msg}"),
            Status::Stats(summary) => format!("stats: {summary}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::TransportError(_) | Status::ServerError(_))
    }
}

/// Presentation capabilities the core drives. Row positions always refer to
/// the ascending name order of the index.
pub trait ViewSink {
    fn append_line(&mut self, line: LogLine);
    fn clear_lines(&mut self);
    fn scroll_to_bottom(&mut self);

    fn upsert_row(&mut self, position: usize, entry: &FileEntry, inserted: bool);
    fn remove_row(&mut self, position: usize);
    fn clear_rows(&mut self);

    fn show_channel(&mut self, channel: &Channel);
    fn set_title(&mut self, title: &str);
    fn set_mask(&mut self, pattern: &str);
    fn set_status(&mut self, status: Option<Status>);
}
