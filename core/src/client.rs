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

use log::{debug, trace};
use serde_json::Value;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::player_events::EventRecord;
use crate::protocol::{ActionReply, ClientHandshake, ServerHandshake, EXPECT_REPLY_CHAR, HEARTBEAT_PART, NO_EVENTS_MARKER};
use crate::transport::{DealerTransport, TransportError, ZmqDealer};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Server did not reply within {0:?}")]
    Timeout(Duration),
    #[error("Malformed server message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Server sent an empty message")]
    EmptyMessage,
    #[error("{error}: {}", .cause.as_deref().unwrap_or("unknown cause"))]
    ServerFailure { error: String, cause: Option<String> },
}

/// Unpacks one action reply into its result.
pub fn reply_result(reply: ActionReply) -> Result<Option<Value>, ClientError> {
    if reply.success {
        Ok(reply.result)
    } else {
        Err(ClientError::ServerFailure {
            error: reply.error.unwrap_or_else(|| "Action failed".to_string()),
            cause: reply.error_cause,
        })
    }
}

/// One action invocation as sent by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub name: String,
    pub params: Vec<Value>,
    pub expect_reply: bool,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self { name: name.into(), params, expect_reply: false }
    }

    pub fn with_reply(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self { name: name.into(), params, expect_reply: true }
    }

    fn push_parts(&self, parts: &mut Vec<String>) {
        let name = if self.expect_reply {
            format!("{}{}", EXPECT_REPLY_CHAR, self.name)
        } else {
            self.name.clone()
        };
        parts.push(name);
        parts.push(Value::Array(self.params.clone()).to_string());
    }
}

pub fn encode_calls(calls: &[ActionCall]) -> Vec<String> {
    let mut parts = Vec::with_capacity(calls.len() * 2);
    for call in calls {
        call.push_parts(&mut parts);
    }
    parts
}

/// Message pushed by the server outside of the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPush {
    /// Per-cycle push. Must be answered, possibly with a heartbeat.
    Events(Vec<EventRecord>),
    /// Results of the actions sent with the previous answer.
    Replies(Vec<ActionReply>),
}

fn decode_push(parts: Vec<String>) -> Result<ServerPush, ClientError> {
    let first = parts.first().ok_or(ClientError::EmptyMessage)?;
    if first.trim_start().starts_with('[') {
        return Ok(ServerPush::Replies(serde_json::from_str(first)?));
    }
    if parts.len() == 1 && first == NO_EVENTS_MARKER {
        return Ok(ServerPush::Events(Vec::new()));
    }
    let events = parts.iter().map(|part| serde_json::from_str(part)).collect::<Result<Vec<EventRecord>, _>>()?;
    Ok(ServerPush::Events(events))
}

/// DEALER side of the protocol.
pub struct SpMsClient<D: DealerTransport> {
    transport: D,
    server_reply_timeout: Duration,
}

impl SpMsClient<ZmqDealer> {
    /// Connects over TCP and performs the handshake, running `actions` in the same round trip.
    pub async fn connect_tcp(config: &ClientConfig, actions: &[ActionCall]) -> Result<(Self, ServerHandshake), ClientError> {
        let dealer = ZmqDealer::connect(&config.endpoint()).await?;
        let handshake = ClientHandshake {
            name: config.name.clone(),
            client_type: config.client_type,
            machine_id: config.machine_id.clone(),
            language: config.language.clone(),
            player_port: config.player_port,
            actions: (!actions.is_empty()).then(|| encode_calls(actions)),
        };
        Self::connect(dealer, &handshake, config.server_reply_timeout).await
    }
}

impl<D: DealerTransport> SpMsClient<D> {
    pub async fn connect(
        mut transport: D,
        handshake: &ClientHandshake,
        server_reply_timeout: Duration,
    ) -> Result<(Self, ServerHandshake), ClientError> {
        transport.send(&[serde_json::to_string(handshake)?]).await?;

        let parts = transport
            .recv(server_reply_timeout)
            .await?
            .ok_or(ClientError::Timeout(server_reply_timeout))?;
        let first = parts.first().ok_or(ClientError::EmptyMessage)?;
        let server_handshake: ServerHandshake = serde_json::from_str(first)?;
        debug!("Connected to {} on {}", server_handshake.name, server_handshake.device_name);

        Ok((Self { transport, server_reply_timeout }, server_handshake))
    }

    pub fn server_reply_timeout(&self) -> Duration {
        self.server_reply_timeout
    }

    /// Waits up to `timeout` for the next server message.
    pub async fn next_push(&mut self, timeout: Duration) -> Result<Option<ServerPush>, ClientError> {
        let Some(parts) = self.transport.recv(timeout).await? else {
            return Ok(None);
        };
        trace!("Received {:?}", parts);
        decode_push(parts).map(Some)
    }

    /// Answers an event push. An empty `calls` sends a heartbeat.
    pub async fn answer(&mut self, calls: &[ActionCall]) -> Result<(), ClientError> {
        if calls.is_empty() {
            self.transport.send(&[HEARTBEAT_PART.to_string()]).await?;
        } else {
            self.transport.send(&encode_calls(calls)).await?;
        }
        Ok(())
    }

    pub async fn disconnect(mut self) {
        self.transport.close().await;
    }
}
