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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::player_state::{RepeatMode, ServerState};

#[derive(Debug, PartialEq, Clone, Error)]
pub enum PlayerError {
    #[error("Feature not supported")]
    FeatureNotSupported,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unknown error: {0}")]
    UnknownError(String),
}

/// Playback capability driven by the server.
///
/// Implementations report every state change through the
/// [`PlayerEventEmitter`](crate::player_events::PlayerEventEmitter) they were built with and must
/// not start playback while the shared readiness barrier is engaged.
#[async_trait]
pub trait PlayerInterface: Send + Sync {
    async fn get_current_state(&self) -> ServerState;

    async fn get_item(&self, index: i32) -> Option<String> {
        let state = self.get_current_state().await;
        usize::try_from(index).ok().and_then(|i| state.queue.get(i).cloned())
    }

    async fn play(&self) -> Result<(), PlayerError>;
    async fn pause(&self) -> Result<(), PlayerError>;
    async fn play_pause(&self) -> Result<(), PlayerError>;

    async fn seek_to_time(&self, position_ms: i64) -> Result<(), PlayerError>;
    async fn seek_to_item(&self, index: i32, position_ms: i64) -> Result<(), PlayerError>;
    /// Returns `false` when there is no next item to move to.
    async fn seek_to_next(&self) -> Result<bool, PlayerError>;
    /// Returns `false` when already at the first item.
    async fn seek_to_previous(&self) -> Result<bool, PlayerError>;
    async fn set_repeat_mode(&self, repeat_mode: RepeatMode) -> Result<(), PlayerError>;

    async fn set_volume(&self, _volume: f64) -> Result<(), PlayerError> {
        Err(PlayerError::FeatureNotSupported)
    }

    /// Returns the index the item was inserted at.
    async fn add_item(&self, item_id: &str, index: i32) -> Result<i32, PlayerError>;
    async fn move_item(&self, from: i32, to: i32) -> Result<(), PlayerError>;
    async fn remove_item(&self, index: i32) -> Result<(), PlayerError>;
    async fn clear_queue(&self) -> Result<(), PlayerError>;

    async fn cancel_radio(&self) -> Result<(), PlayerError> {
        Err(PlayerError::FeatureNotSupported)
    }

    /// A client reported the real duration of `item_id`.
    async fn on_duration_loaded(&self, _item_id: &str, _duration: Duration) {}

    /// Whether a real audio backend sits behind this player. Enables player-scope actions.
    fn is_audio_backend(&self) -> bool {
        false
    }

    /// Stops background work. Called once when the server is released.
    async fn release(&self) {}
}

#[derive(Clone)]
pub struct Player {
    player_impl: Arc<dyn PlayerInterface>,
}

impl Player {
    pub fn new(player_impl: Arc<dyn PlayerInterface>) -> Self {
        Self { player_impl }
    }
}

#[async_trait]
impl PlayerInterface for Player {
    async fn get_current_state(&self) -> ServerState {
        self.player_impl.get_current_state().await
    }
    async fn get_item(&self, index: i32) -> Option<String> {
        self.player_impl.get_item(index).await
    }
    async fn play(&self) -> Result<(), PlayerError> {
        self.player_impl.play().await
    }
    async fn pause(&self) -> Result<(), PlayerError> {
        self.player_impl.pause().await
    }
    async fn play_pause(&self) -> Result<(), PlayerError> {
        self.player_impl.play_pause().await
    }
    async fn seek_to_time(&self, position_ms: i64) -> Result<(), PlayerError> {
        self.player_impl.seek_to_time(position_ms).await
    }
    async fn seek_to_item(&self, index: i32, position_ms: i64) -> Result<(), PlayerError> {
        self.player_impl.seek_to_item(index, position_ms).await
    }
    async fn seek_to_next(&self) -> Result<bool, PlayerError> {
        self.player_impl.seek_to_next().await
    }
    async fn seek_to_previous(&self) -> Result<bool, PlayerError> {
        self.player_impl.seek_to_previous().await
    }
    async fn set_repeat_mode(&self, repeat_mode: RepeatMode) -> Result<(), PlayerError> {
        self.player_impl.set_repeat_mode(repeat_mode).await
    }
    async fn set_volume(&self, volume: f64) -> Result<(), PlayerError> {
        self.player_impl.set_volume(volume).await
    }
    async fn add_item(&self, item_id: &str, index: i32) -> Result<i32, PlayerError> {
        self.player_impl.add_item(item_id, index).await
    }
    async fn move_item(&self, from: i32, to: i32) -> Result<(), PlayerError> {
        self.player_impl.move_item(from, to).await
    }
    async fn remove_item(&self, index: i32) -> Result<(), PlayerError> {
        self.player_impl.remove_item(index).await
    }
    async fn clear_queue(&self) -> Result<(), PlayerError> {
        self.player_impl.clear_queue().await
    }
    async fn cancel_radio(&self) -> Result<(), PlayerError> {
        self.player_impl.cancel_radio().await
    }
    async fn on_duration_loaded(&self, item_id: &str, duration: Duration) {
        self.player_impl.on_duration_loaded(item_id, duration).await
    }

    fn is_audio_backend(&self) -> bool {
        self.player_impl.is_audio_backend()
    }
    async fn release(&self) {
        self.player_impl.release().await
    }
}
