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

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

/// Source of item durations for players that cannot measure media themselves.
#[async_trait]
pub trait DurationProvider: Send + Sync {
    fn cached(&self, item_id: &str) -> Option<Duration>;

    /// Waits until the duration of `item_id` is known. `None` if it never can be.
    async fn resolve(&self, item_id: &str) -> Option<Duration>;
}

/// Durations reported by clients, with one shared slot per item.
///
/// Waiters for an item subscribe to its slot, so any number of them complete together when the
/// first client reports the duration.
#[derive(Debug, Default)]
pub struct DurationCache {
    slots: Mutex<HashMap<String, watch::Sender<Option<Duration>>>>,
}

impl DurationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item_id: &str, duration: Duration) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(item_id) {
            Some(slot) => {
                slot.send_replace(Some(duration));
            }
            None => {
                let (slot, _) = watch::channel(Some(duration));
                slots.insert(item_id.to_string(), slot);
            }
        }
    }

    fn subscribe(&self, item_id: &str) -> watch::Receiver<Option<Duration>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(item_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}

#[async_trait]
impl DurationProvider for DurationCache {
    fn cached(&self, item_id: &str) -> Option<Duration> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(item_id).and_then(|slot| *slot.borrow())
    }

    async fn resolve(&self, item_id: &str) -> Option<Duration> {
        let mut slot = self.subscribe(item_id);
        loop {
            if let Some(duration) = *slot.borrow_and_update() {
                return Some(duration);
            }
            if slot.changed().await.is_err() {
                return None;
            }
        }
    }
}
