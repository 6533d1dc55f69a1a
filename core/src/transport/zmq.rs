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

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use zeromq::{DealerSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

use super::{frames_to_strings, DealerTransport, RoutedMessage, RouterTransport, TransportError};
use crate::framing;

fn build_message(head: Option<&Bytes>, parts: &[String]) -> Result<ZmqMessage, TransportError> {
    let frames: Vec<Bytes> = head
        .cloned()
        .into_iter()
        .chain(framing::encode(parts).into_iter().map(Bytes::from))
        .collect();
    ZmqMessage::try_from(frames).map_err(|_| TransportError::EmptyMessage)
}

/// ROUTER socket bound to a TCP endpoint.
pub struct ZmqRouter {
    socket: Option<RouterSocket>,
    endpoint: String,
}

impl ZmqRouter {
    pub async fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let mut socket = RouterSocket::new();
        let bound = socket.bind(endpoint).await.map_err(|source| TransportError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;
        debug!("Router bound to {}", bound);
        Ok(Self { socket: Some(socket), endpoint: bound.to_string() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RouterTransport for ZmqRouter {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<RoutedMessage>, TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotOpen)?;
        let message = match tokio::time::timeout(timeout, socket.recv()).await {
            Err(_elapsed) => return Ok(None),
            Ok(result) => result.map_err(TransportError::Receive)?,
        };

        let mut frames = message.into_vec().into_iter();
        let identity = frames.next().ok_or(TransportError::EmptyMessage)?;
        let parts = framing::decode(&frames_to_strings(frames));
        Ok(Some(RoutedMessage { identity, parts }))
    }

    async fn send(&mut self, identity: &Bytes, parts: &[String]) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotOpen)?;
        let message = build_message(Some(identity), parts)?;
        match socket.send(message).await {
            Ok(()) => Ok(()),
            // the router reports peers that went away this way
            Err(ZmqError::Other(reason)) => {
                debug!("Router send to {:?} failed: {}", identity, reason);
                Err(TransportError::UnknownPeer(identity.clone()))
            }
            Err(e) => Err(TransportError::Send(e)),
        }
    }

    async fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            for error in socket.close().await {
                warn!("Error while closing router {}: {}", self.endpoint, error);
            }
        }
    }
}

/// DEALER socket connected to a server.
pub struct ZmqDealer {
    socket: Option<DealerSocket>,
    endpoint: String,
}

impl ZmqDealer {
    pub async fn connect(endpoint: &str) -> Result<Self, TransportError> {
        let mut socket = DealerSocket::new();
        socket.connect(endpoint).await.map_err(|source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
        Ok(Self { socket: Some(socket), endpoint: endpoint.to_string() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DealerTransport for ZmqDealer {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<String>>, TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotOpen)?;
        match tokio::time::timeout(timeout, socket.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(result) => {
                let message = result.map_err(TransportError::Receive)?;
                Ok(Some(framing::decode(&frames_to_strings(message.into_vec()))))
            }
        }
    }

    async fn send(&mut self, parts: &[String]) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotOpen)?;
        socket.send(build_message(None, parts)?).await.map_err(TransportError::Send)
    }

    async fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            for error in socket.close().await {
                warn!("Error while closing connection to {}: {}", self.endpoint, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_message_leads_with_identity() {
        let identity = Bytes::from_static(b"peer");
        let message = build_message(Some(&identity), &["a".to_string(), "b".to_string()]).unwrap();
        let frames = message.into_vec();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], identity);
        assert_eq!(frames[1], Bytes::from("a\u{3}"));
    }

    #[test]
    fn empty_dealer_message_is_rejected() {
        assert!(matches!(build_message(None, &[]), Err(TransportError::EmptyMessage)));
    }
}
