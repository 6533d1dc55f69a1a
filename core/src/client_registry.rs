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

use std::fmt;

use bytes::Bytes;

use crate::player_events::PlayerEvent;
use crate::protocol::{client_id_from_identity, ClientId, ClientInfo, ClientType, Language};

/// A peer that completed the handshake and receives event pushes.
#[derive(Debug, Clone)]
pub struct Client {
    pub identity: Bytes,
    pub id: ClientId,
    pub info: ClientInfo,
    /// Highest event id already delivered.
    pub event_head: u64,
    pub ready_to_play: bool,
    pub failed_connection_attempts: u32,
}

impl Client {
    pub fn new(identity: Bytes, info: ClientInfo, event_head: u64) -> Self {
        let id = client_id_from_identity(&identity);
        Self {
            identity,
            id,
            info,
            event_head,
            ready_to_play: false,
            failed_connection_attempts: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn client_type(&self) -> ClientType {
        self.info.client_type
    }

    pub fn language(&self) -> Language {
        self.info.language
    }

    pub fn plays_audio(&self) -> bool {
        self.info.client_type.plays_audio()
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Client(id={}, name={}, type={:?}, language={:?}, event_head={})",
            self.id,
            self.info.name,
            self.info.client_type,
            self.info.language,
            self.event_head
        )
    }
}

/// Registered clients in registration order.
///
/// Clients are addressed by index while a poll cycle walks the list from the newest entry down,
/// so registering appends and eviction removes only the entry currently being visited.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Client> {
        self.clients.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Client> {
        self.clients.get_mut(index)
    }

    pub fn find(&self, id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn find_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.find(id).is_some()
    }

    pub fn register(&mut self, client: Client) {
        self.clients.push(client);
    }

    pub fn remove(&mut self, index: usize) -> Client {
        self.clients.remove(index)
    }

    /// Returns `requested` trimmed, or suffixed with ` #2`, ` #3`, ... until no client uses it.
    pub fn unique_name(&self, requested: &str) -> String {
        let requested = requested.trim();
        let mut name = requested.to_string();
        let mut number = 1;
        while self.clients.iter().any(|c| c.info.name == name) {
            number += 1;
            name = format!("{} #{}", requested, number);
        }
        name
    }

    /// Clears every readiness flag. Returns whether any audio client is registered.
    pub fn mark_all_not_ready(&mut self) -> bool {
        let mut audio_client_present = false;
        for client in self.clients.iter_mut() {
            client.ready_to_play = false;
            audio_client_present |= client.plays_audio();
        }
        audio_client_present
    }

    pub fn audio_clients_not_ready(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter().filter(|c| c.plays_audio() && !c.ready_to_play)
    }

    pub fn all_audio_clients_ready(&self) -> bool {
        self.audio_clients_not_ready().next().is_none()
    }

    /// Number of registered clients that should receive `event` caused by `originator`.
    pub fn recipients_of(&self, event: &PlayerEvent, originator: Option<ClientId>) -> usize {
        self.clients
            .iter()
            .filter(|c| c.info.client_type.receives_events())
            .filter(|c| event.sends_to_originator() || originator != Some(c.id))
            .count()
    }

    pub fn infos(&self, caller: Option<ClientId>) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .map(|c| ClientInfo { is_caller: Some(c.id) == caller, ..c.info.clone() })
            .collect()
    }
}
