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

use std::collections::BTreeMap;

use futures::channel::mpsc;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerEventType {
    ItemTransition,
    PropertyChanged,
    Seeked,
    ItemAdded,
    ItemRemoved,
    ItemMoved,
    Cleared,
    /// Backend finished buffering. Handled by the server, never broadcast.
    ReadyToPlay,
    CancelRadio,
}

/// A playback state change, described by its effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEvent {
    #[serde(rename = "type")]
    pub event_type: PlayerEventType,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl PlayerEvent {
    fn with_properties<const N: usize>(event_type: PlayerEventType, properties: [(&str, Value); N]) -> Self {
        Self {
            event_type,
            properties: properties.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    pub fn item_transition(index: i32) -> Self {
        Self::with_properties(PlayerEventType::ItemTransition, [("index", index.into())])
    }

    pub fn property_changed(key: &str, value: impl Into<Value>) -> Self {
        Self::with_properties(PlayerEventType::PropertyChanged, [("key", key.into()), ("value", value.into())])
    }

    pub fn seeked(position_ms: i64) -> Self {
        Self::with_properties(PlayerEventType::Seeked, [("position_ms", position_ms.into())])
    }

    pub fn item_added(item_id: &str, index: i32) -> Self {
        Self::with_properties(PlayerEventType::ItemAdded, [("item_id", item_id.into()), ("index", index.into())])
    }

    pub fn item_removed(index: i32) -> Self {
        Self::with_properties(PlayerEventType::ItemRemoved, [("index", index.into())])
    }

    pub fn item_moved(from: i32, to: i32) -> Self {
        Self::with_properties(PlayerEventType::ItemMoved, [("from", from.into()), ("to", to.into())])
    }

    pub fn cleared() -> Self {
        Self::with_properties(PlayerEventType::Cleared, [])
    }

    pub fn ready_to_play() -> Self {
        Self::with_properties(PlayerEventType::ReadyToPlay, [])
    }

    pub fn cancel_radio() -> Self {
        Self::with_properties(PlayerEventType::CancelRadio, [])
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Whether enqueueing `self` makes an undelivered `other` redundant.
    ///
    /// Only events that carry absolute state supersede each other: a property change replaces an
    /// earlier change of the same key, and seeks, item transitions and clears replace their own
    /// kind. Queue structure events are positional and never collapse.
    pub fn overrides(&self, other: &PlayerEvent) -> bool {
        use PlayerEventType::*;
        match (self.event_type, other.event_type) {
            (PropertyChanged, PropertyChanged) => self.property("key") == other.property("key"),
            (Seeked, Seeked) | (ItemTransition, ItemTransition) | (Cleared, Cleared) => true,
            _ => false,
        }
    }

    pub fn sends_to_originator(&self) -> bool {
        self.event_type != PlayerEventType::CancelRadio
    }
}

impl std::fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(", self.event_type)?;
        for (i, (key, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, ")")
    }
}

/// Wire form of a logged event as pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub event: PlayerEvent,
    pub event_id: u64,
    pub client_id: Option<ClientId>,
}

/// An event as produced by a player, before the server assigns it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub event: PlayerEvent,
    /// Set for changes that no client caused, e.g. reaching the end of an item.
    pub clientless: bool,
}

pub type PlayerEventListener = mpsc::UnboundedReceiver<EmittedEvent>;

#[derive(Clone, Debug)]
pub struct PlayerEventEmitter {
    tx: mpsc::UnboundedSender<EmittedEvent>,
}

impl PlayerEventEmitter {
    pub fn channel() -> (Self, PlayerEventListener) {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: PlayerEvent) {
        self.send(EmittedEvent { event, clientless: false });
    }

    pub fn emit_clientless(&self, event: PlayerEvent) {
        self.send(EmittedEvent { event, clientless: true });
    }

    fn send(&self, event: EmittedEvent) {
        if let Err(e) = self.tx.unbounded_send(event) {
            debug!("Dropping player event, listener is gone: {}", e.into_inner().event);
        }
    }
}
