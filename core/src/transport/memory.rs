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

//! In-process ROUTER/DEALER pair over tokio channels, framing included.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{DealerTransport, RoutedMessage, RouterTransport, TransportError};
use crate::framing;

type Peers = Arc<Mutex<HashMap<Bytes, mpsc::UnboundedSender<Vec<String>>>>>;

async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, timeout: Duration) -> Result<Option<T>, TransportError> {
    if timeout.is_zero() {
        return match rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Closed),
        };
    }
    match tokio::time::timeout(timeout, rx.recv()).await {
        Err(_elapsed) => Ok(None),
        Ok(Some(item)) => Ok(Some(item)),
        Ok(None) => Err(TransportError::Closed),
    }
}

pub struct MemoryRouter {
    inbound_rx: mpsc::UnboundedReceiver<(Bytes, Vec<String>)>,
    connector: MemoryConnector,
}

/// Creates dealers attached to one [`MemoryRouter`].
#[derive(Clone)]
pub struct MemoryConnector {
    inbound_tx: mpsc::UnboundedSender<(Bytes, Vec<String>)>,
    peers: Peers,
}

pub struct MemoryDealer {
    identity: Bytes,
    outbound_tx: mpsc::UnboundedSender<(Bytes, Vec<String>)>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<String>>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connector = MemoryConnector { inbound_tx, peers: Arc::default() };
        Self { inbound_rx, connector }
    }

    pub fn connector(&self) -> MemoryConnector {
        self.connector.clone()
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn connect(&self, identity: impl Into<Bytes>) -> MemoryDealer {
        let identity = identity.into();
        let (tx, inbound_rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).insert(identity.clone(), tx);
        MemoryDealer { identity, outbound_tx: self.inbound_tx.clone(), inbound_rx }
    }
}

#[async_trait]
impl RouterTransport for MemoryRouter {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<RoutedMessage>, TransportError> {
        let received = recv_within(&mut self.inbound_rx, timeout).await?;
        Ok(received.map(|(identity, frames)| RoutedMessage { identity, parts: framing::decode(&frames) }))
    }

    async fn send(&mut self, identity: &Bytes, parts: &[String]) -> Result<(), TransportError> {
        let peers = self.connector.peers.lock().unwrap_or_else(|e| e.into_inner());
        let peer = peers.get(identity).ok_or_else(|| TransportError::UnknownPeer(identity.clone()))?;
        peer.send(framing::encode(parts)).map_err(|_| TransportError::UnknownPeer(identity.clone()))
    }
}

impl MemoryDealer {
    pub fn identity(&self) -> &Bytes {
        &self.identity
    }
}

#[async_trait]
impl DealerTransport for MemoryDealer {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<String>>, TransportError> {
        Ok(recv_within(&mut self.inbound_rx, timeout).await?.map(|frames| framing::decode(&frames)))
    }

    async fn send(&mut self, parts: &[String]) -> Result<(), TransportError> {
        self.outbound_tx
            .send((self.identity.clone(), framing::encode(parts)))
            .map_err(|_| TransportError::Closed)
    }
}
