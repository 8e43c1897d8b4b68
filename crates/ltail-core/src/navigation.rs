//! Location handling and the detach/attach sequence run on every navigation.

use crate::channel::{Channel, ChannelMultiplexer};
use crate::connection::Link;
use crate::renderer::LogRenderer;
use crate::view::ViewSink;
use percent_encoding::percent_decode_str;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;
use url::{form_urlencoded, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fragment is not valid utf-8: {0}")]
    InvalidEncoding(String),
}

/// Where the user is: the index (empty fragment) or one file, plus the mask
/// carried by the `mask` query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    channel: Channel,
    mask: Option<String>,
}

impl Location {
    pub fn index() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            channel: Channel::file(path),
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        let mask = mask.into();
        self.mask = (!mask.is_empty()).then_some(mask);
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn mask(&self) -> Option<&str> {
        self.mask.as_deref()
    }

    /// Accepts a full URL, a `#fragment`, or a bare `path?mask=...`.
    pub fn parse(input: &str) -> Result<Self, LocationError> {
        let input = input.trim();
        if input.contains("://") {
            let url = Url::parse(input).map_err(|err| LocationError::InvalidUrl(err.to_string()))?;
            return Self::from_url(&url);
        }
        parse_fragment(input.strip_prefix('#').unwrap_or(input))
    }

    /// The fragment names the file; a `mask` inside the fragment wins over
    /// one in the URL query.
    pub fn from_url(url: &Url) -> Result<Self, LocationError> {
        let mut location = parse_fragment(url.fragment().unwrap_or(""))?;
        if location.mask.is_none() {
            if let Some(mask) = mask_param(url.query().unwrap_or("")) {
                location = location.with_mask(mask);
            }
        }
        Ok(location)
    }
}

fn parse_fragment(fragment: &str) -> Result<Location, LocationError> {
    let (path, query) = match fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (fragment, ""),
    };
    let path = percent_decode_str(path)
        .decode_utf8()
        .map_err(|err| LocationError::InvalidEncoding(err.to_string()))?;
    let location = Location::file(path.into_owned());
    Ok(match mask_param(query) {
        Some(mask) => location.with_mask(mask),
        None => location,
    })
}

fn mask_param(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "mask")
        .map(|(_, value)| value.into_owned())
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.channel.as_wire())?;
        if let Some(mask) = &self.mask {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("mask", mask)
                .finish();
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Back/forward history of locations plus the attach sequencing.
#[derive(Debug)]
pub struct NavigationController {
    history: Vec<Location>,
    cursor: usize,
}

impl NavigationController {
    pub fn new(initial: Location) -> Self {
        Self {
            history: vec![initial],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Location {
        &self.history[self.cursor]
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// Returns false when `location` is already current.
    pub fn push(&mut self, location: Location) -> bool {
        if *self.current() == location {
            return false;
        }
        self.history.truncate(self.cursor + 1);
        self.history.push(location);
        self.cursor = self.history.len() - 1;
        true
    }

    pub fn back(&mut self) -> bool {
        if !self.can_go_back() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn forward(&mut self) -> bool {
        if !self.can_go_forward() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Rewrites the mask of the current entry in place.
    pub fn set_mask(&mut self, mask: &str) {
        let current = self.history[self.cursor].clone();
        self.history[self.cursor] = current.with_mask(mask);
    }

    /// Detach whatever is attached, attach the channel of the current
    /// location, then start a fresh view for it. Sends that fail are dropped.
    pub fn sync(
        &self,
        now: Instant,
        channels: &mut ChannelMultiplexer,
        link: &mut Link<'_>,
        renderer: &mut LogRenderer,
        view: &mut dyn ViewSink,
    ) {
        let location = self.current();
        if let Some(attached) = channels.attached().cloned() {
            if let Err(err) = channels.detach(now, attached, link) {
                debug!(event = "navigation_detach_failed", error = %err);
            }
        }
        let desired = location.channel().clone();
        if let Err(err) = channels.attach(now, desired.clone(), link) {
            debug!(event = "navigation_attach_failed", error = %err);
        }
        renderer.reset(desired, view);
        renderer.set_mask(location.mask().unwrap_or(""), view);
    }
}
