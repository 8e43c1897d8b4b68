//! Headless core of the ltail streaming client.
//!
//! Everything here is synchronous and driven by the caller: socket events,
//! user actions and timer deadlines go in through [`client::Client`], and
//! presentation changes come out through a [`view::ViewSink`].

pub mod channel;
pub mod client;
pub mod connection;
pub mod index;
pub mod navigation;
pub mod protocol;
pub mod renderer;
pub mod timer;
pub mod timestamp;
pub mod view;

#[cfg(test)]
mod test_support;

pub use channel::{AckOutcome, Channel, ChannelMultiplexer};
pub use client::{Client, ClientConfig, Diagnostics};
pub use connection::{
    ConnectionId, ConnectionManager, ConnectionState, SendError, SocketEvent, Transport,
    TransportError,
};
pub use index::{FileEntry, IndexChange, IndexModel};
pub use navigation::{Location, LocationError, NavigationController};
pub use protocol::{Inbound, Outbound, RecordError};
pub use renderer::{LogLine, LogRenderer, Mask};
pub use timestamp::Timestamp;
pub use view::{Status, ViewSink};
