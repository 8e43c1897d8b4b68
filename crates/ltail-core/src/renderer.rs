//! Live log view state: mask highlighting, follow-scroll and unread tracking.

use crate::channel::Channel;
use crate::timer::Timer;
use crate::view::ViewSink;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_SCROLL_DEBOUNCE: Duration = Duration::from_millis(10);
pub const UNREAD_CAP: u64 = 999;
pub const UNREAD_PLACEHOLDER: &str = "999+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub highlighted: bool,
}

/// Highlight pattern. A pattern that is not a valid regular expression is
/// matched literally.
#[derive(Debug, Clone, Default)]
pub struct Mask {
    pattern: String,
    regex: Option<Regex>,
    literal: bool,
}

impl Mask {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Self::default();
        }
        let (regex, literal) = match Regex::new(&pattern) {
            Ok(regex) => (Some(regex), false),
            Err(err) => {
                debug!(event = "mask_literal_fallback", pattern = %pattern, error = %err);
                (Regex::new(&regex::escape(&pattern)).ok(), true)
            }
        };
        Self {
            pattern,
            regex,
            literal,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|regex| regex.is_match(text))
    }

    /// Byte ranges of non-empty matches, for span-level highlighting.
    pub fn ranges(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(regex) => regex
                .find_iter(text)
                .filter(|m| !m.is_empty())
                .map(|m| (m.start(), m.end()))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct LogRenderer {
    focused: bool,
    unread: u64,
    follow: bool,
    mask: Mask,
    scroll: Timer,
    debounce: Duration,
    host: Option<String>,
    channel: Channel,
    last_title: Option<String>,
}

impl LogRenderer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            focused: true,
            unread: 0,
            follow: true,
            mask: Mask::default(),
            scroll: Timer::default(),
            debounce,
            host: None,
            channel: Channel::Index,
            last_title: None,
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn unread(&self) -> u64 {
        self.unread
    }

    pub fn follows(&self) -> bool {
        self.follow
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scroll.deadline()
    }

    pub fn append_line(&mut self, now: Instant, text: String, view: &mut dyn ViewSink) {
        let highlighted = !self.mask.is_empty() && self.mask.is_match(&text);
        view.append_line(LogLine { text, highlighted });
        if !self.focused {
            self.unread += 1;
            self.refresh_title(view);
        }
        // appends inside one window share the pending scroll
        if self.follow && !self.scroll.is_armed() {
            self.scroll.schedule_in(now, self.debounce);
        }
    }

    pub fn poll(&mut self, now: Instant, view: &mut dyn ViewSink) {
        if self.scroll.fire(now) && self.follow {
            view.scroll_to_bottom();
        }
    }

    /// `offset` counts lines scrolled from the top; `max_offset` is the
    /// offset at which the last line sits on the bottom edge.
    pub fn on_user_scroll(&mut self, offset: usize, max_offset: usize) {
        let follow = offset >= max_offset;
        if follow != self.follow {
            debug!(event = "follow_changed", follow);
        }
        self.follow = follow;
        if !follow {
            self.scroll.cancel();
        }
    }

    pub fn set_focus(&mut self, focused: bool, view: &mut dyn ViewSink) {
        self.focused = focused;
        if focused {
            self.unread = 0;
            self.refresh_title(view);
        }
    }

    pub fn set_mask(&mut self, pattern: &str, view: &mut dyn ViewSink) {
        self.mask = Mask::new(pattern);
        view.set_mask(self.mask.pattern());
    }

    pub fn set_host(&mut self, host: String, view: &mut dyn ViewSink) {
        self.host = Some(host);
        self.refresh_title(view);
    }

    /// Starts a fresh view for `channel`.
    pub fn reset(&mut self, channel: Channel, view: &mut dyn ViewSink) {
        view.clear_lines();
        self.scroll.cancel();
        self.unread = 0;
        self.focused = true;
        self.follow = true;
        view.show_channel(&channel);
        self.channel = channel;
        self.refresh_title(view);
    }

    pub fn title(&self) -> String {
        let base = match &self.host {
            Some(host) => format!("{host}: {}", self.channel),
            None => self.channel.to_string(),
        };
        match self.unread {
            0 => base,
            n if n > UNREAD_CAP => format!("({UNREAD_PLACEHOLDER}) {base}"),
            n => format!("({n}) {base}"),
        }
    }

    fn refresh_title(&mut self, view: &mut dyn ViewSink) {
        let title = self.title();
        if self.last_title.as_deref() == Some(title.as_str()) {
            return;
        }
        view.set_title(&title);
        self.last_title = Some(title);
    }
}

impl Default for LogRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_DEBOUNCE)
    }
}
