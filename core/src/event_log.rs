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

use log::{debug, trace};

use crate::player_events::{EventRecord, PlayerEvent};
use crate::protocol::ClientId;

/// Metadata assigned when an event enters the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMeta {
    pub event_id: u64,
    pub client_id: Option<ClientId>,
    pub pending_client_amount: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub event: PlayerEvent,
    pub meta: EventMeta,
}

impl LoggedEvent {
    /// Whether a client whose cursor sits at `event_head` still has to receive this event.
    pub fn is_pending_for(&self, client_id: ClientId, event_head: u64) -> bool {
        self.meta.event_id > event_head
            && (self.event.sends_to_originator() || self.meta.client_id != Some(client_id))
    }

    fn to_record(&self) -> EventRecord {
        EventRecord {
            event: self.event.clone(),
            event_id: self.meta.event_id,
            client_id: self.meta.client_id,
        }
    }
}

/// Events not yet delivered to every client that was registered when they happened.
///
/// Ids are assigned from 1 upwards and a client cursor holds the highest id it has received, so
/// each event reaches a client at most once and in id order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<LoggedEvent>,
    last_event_id: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recently enqueued event, or 0 before the first one.
    pub fn last_event_id(&self) -> u64 {
        self.last_event_id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoggedEvent> {
        self.events.iter()
    }

    /// Appends `event` for `recipients` clients, dropping pending events it supersedes.
    pub fn enqueue(&mut self, event: PlayerEvent, client_id: Option<ClientId>, recipients: usize) -> u64 {
        self.last_event_id += 1;
        let event_id = self.last_event_id;

        let before = self.events.len();
        self.events.retain(|other| !event.overrides(&other.event));
        if self.events.len() != before {
            trace!("Event {} superseded {} pending event(s)", event, before - self.events.len());
        }

        if recipients == 0 {
            debug!("Event {} has no recipients, not logging it", event);
            return event_id;
        }

        self.events.push(LoggedEvent {
            event,
            meta: EventMeta { event_id, client_id, pending_client_amount: recipients },
        });
        event_id
    }

    /// Collects everything pending for one client and marks it consumed by that client.
    pub fn take_for_client(&mut self, client_id: ClientId, event_head: u64) -> Vec<EventRecord> {
        let mut records = Vec::new();
        for logged in self.events.iter_mut() {
            if logged.is_pending_for(client_id, event_head) {
                records.push(logged.to_record());
                logged.meta.pending_client_amount = logged.meta.pending_client_amount.saturating_sub(1);
            }
        }
        self.purge_consumed();
        records
    }

    /// Releases the references a removed client still held.
    pub fn forget_client(&mut self, client_id: ClientId, event_head: u64) {
        for logged in self.events.iter_mut() {
            if logged.is_pending_for(client_id, event_head) {
                logged.meta.pending_client_amount = logged.meta.pending_client_amount.saturating_sub(1);
            }
        }
        self.purge_consumed();
    }

    fn purge_consumed(&mut self) {
        self.events.retain(|logged| logged.meta.pending_client_amount > 0);
    }
}
