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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    #[default]
    Idle,
    Buffering,
    Ready,
    Ended,
}

impl PlayerStatus {
    /// Position in declaration order, used in `state` property events.
    pub fn ordinal(&self) -> i64 {
        match self {
            PlayerStatus::Idle => 0,
            PlayerStatus::Buffering => 1,
            PlayerStatus::Ready => 2,
            PlayerStatus::Ended => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    pub fn ordinal(&self) -> i64 {
        match self {
            RepeatMode::None => 0,
            RepeatMode::One => 1,
            RepeatMode::All => 2,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Option<RepeatMode> {
        match ordinal {
            0 => Some(RepeatMode::None),
            1 => Some(RepeatMode::One),
            2 => Some(RepeatMode::All),
            _ => None,
        }
    }
}

/// Snapshot of the playback state, sent in handshakes and returned by the `status` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub queue: Vec<String>,
    pub state: PlayerStatus,
    pub is_playing: bool,
    pub current_item_index: i32,
    pub current_position_ms: i64,
    pub duration_ms: i64,
    pub repeat_mode: RepeatMode,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            state: PlayerStatus::Idle,
            is_playing: false,
            current_item_index: -1,
            current_position_ms: 0,
            duration_ms: 0,
            repeat_mode: RepeatMode::None,
            volume: default_volume(),
        }
    }
}

impl ServerState {
    pub fn current_item(&self) -> Option<&str> {
        usize::try_from(self.current_item_index)
            .ok()
            .and_then(|index| self.queue.get(index))
            .map(String::as_str)
    }
}
