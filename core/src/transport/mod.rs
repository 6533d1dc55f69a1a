// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Identity addressed message transport. The server holds the ROUTER end, clients the DEALER end.
//!
//! Transports carry logical message parts and apply [`crate::framing`] on the wire.

pub mod memory;
pub mod zmq;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use self::zmq::{ZmqDealer, ZmqRouter};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: ::zeromq::ZmqError,
    },
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: ::zeromq::ZmqError,
    },
    #[error("Send failed: {0}")]
    Send(#[source] ::zeromq::ZmqError),
    #[error("Receive failed: {0}")]
    Receive(#[source] ::zeromq::ZmqError),
    #[error("No peer with identity {0:?}")]
    UnknownPeer(Bytes),
    #[error("Received a message without payload")]
    EmptyMessage,
    #[error("Socket is not open")]
    NotOpen,
    #[error("Transport channel closed")]
    Closed,
}

impl TransportError {
    /// Whether the local transport itself is broken. Anything else is caused by one remote peer
    /// and shows up to the server as that peer not replying.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::UnknownPeer(_) | TransportError::EmptyMessage)
    }
}

/// A message received by the ROUTER end, tagged with the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    pub identity: Bytes,
    pub parts: Vec<String>,
}

#[async_trait]
pub trait RouterTransport: Send {
    /// Waits at most `timeout` for a message. `Ok(None)` when nothing arrived in time; a zero
    /// timeout only returns what is already queued.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<RoutedMessage>, TransportError>;

    /// Sends all `parts` to one peer as a single message.
    async fn send(&mut self, identity: &Bytes, parts: &[String]) -> Result<(), TransportError>;

    /// Releases the socket. Calling it again does nothing.
    async fn close(&mut self) {}
}

#[async_trait]
pub trait DealerTransport: Send {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<String>>, TransportError>;

    async fn send(&mut self, parts: &[String]) -> Result<(), TransportError>;

    async fn close(&mut self) {}
}

pub(crate) fn frames_to_strings(frames: impl IntoIterator<Item = Bytes>) -> Vec<String> {
    frames.into_iter().map(|frame| String::from_utf8_lossy(&frame).into_owned()).collect()
}
