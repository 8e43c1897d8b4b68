//! Channel identity and the attach/detach multiplexer.
//!
//! At most one tail channel is attached at a time. Acknowledgments may arrive
//! late or out of order relative to the commands that caused them, so every ack
//! is reconciled against current intent instead of being applied blindly.

use crate::connection::{Link, SendError};
use crate::protocol::Outbound;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

/// A streamable feed: the file index or one log file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Index,
    File(String),
}

impl Channel {
    /// An empty path names the index.
    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        if path.is_empty() {
            Channel::Index
        } else {
            Channel::File(path)
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Channel::Index)
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Channel::Index => None,
            Channel::File(path) => Some(path),
        }
    }

    pub fn as_wire(&self) -> &str {
        self.path().unwrap_or("")
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Index => f.write_str("index"),
            Channel::File(path) => f.write_str(path),
        }
    }
}

impl Serialize for Channel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let path = Option::<String>::deserialize(deserializer)?;
        Ok(Channel::file(path.unwrap_or_default()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Recorded,
    Cleared,
    Stale,
}

#[derive(Debug, Default)]
pub struct ChannelMultiplexer {
    attached: Option<Channel>,
    requested: Option<Channel>,
}

impl ChannelMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel the server last confirmed, or `None` while unknown.
    pub fn attached(&self) -> Option<&Channel> {
        self.attached.as_ref()
    }

    /// The channel of the most recently sent attach.
    pub fn requested(&self) -> Option<&Channel> {
        self.requested.as_ref()
    }

    pub fn attach(
        &mut self,
        now: Instant,
        channel: Channel,
        link: &mut Link<'_>,
    ) -> Result<(), SendError> {
        link.send(
            now,
            &Outbound::Attach {
                channel: channel.clone(),
            },
        )?;
        debug!(event = "attach_sent", channel = %channel);
        self.requested = Some(channel);
        Ok(())
    }

    pub fn detach(
        &mut self,
        now: Instant,
        channel: Channel,
        link: &mut Link<'_>,
    ) -> Result<(), SendError> {
        link.send(
            now,
            &Outbound::Detach {
                channel: channel.clone(),
            },
        )?;
        debug!(event = "detach_sent", channel = %channel);
        Ok(())
    }

    /// An ack for anything but the latest attach is stale. With no attach sent
    /// since the last reset every ack is taken as authoritative.
    pub fn on_attach_ack(&mut self, channel: Channel) -> AckOutcome {
        if let Some(requested) = &self.requested {
            if *requested != channel {
                warn!(event = "stale_attach_ack", channel = %channel, requested = %requested);
                return AckOutcome::Stale;
            }
        }
        self.attached = Some(channel);
        AckOutcome::Recorded
    }

    pub fn on_detach_ack(&mut self, channel: &Channel) -> AckOutcome {
        if self.attached.as_ref() == Some(channel) {
            self.attached = None;
            AckOutcome::Cleared
        } else {
            debug!(event = "stale_detach_ack", channel = %channel);
            AckOutcome::Stale
        }
    }

    /// Forgets all server-side session state; used when a connection opens.
    pub fn reset(&mut self) {
        self.attached = None;
        self.requested = None;
    }
}
