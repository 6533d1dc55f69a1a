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

use tokio::time::Instant;

/// Position clock of the headless player.
///
/// While playing, the position is derived from the instant playback last resumed, so it is exact
/// whenever it is read and no ticking timer is needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PlaybackState {
    Playing { resumed_at: Instant, offset: Duration },
    Paused { position: Duration },
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Paused { position: Duration::ZERO }
    }
}

impl PlaybackState {
    pub fn paused(position: Duration) -> Self {
        PlaybackState::Paused { position }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn current_position(&self) -> Duration {
        match self {
            PlaybackState::Playing { resumed_at, offset } => *offset + resumed_at.elapsed(),
            PlaybackState::Paused { position } => *position,
        }
    }

    pub fn to_playing(self) -> Self {
        match self {
            PlaybackState::Playing { .. } => self,
            PlaybackState::Paused { position } => PlaybackState::Playing { resumed_at: Instant::now(), offset: position },
        }
    }

    pub fn to_paused(self) -> Self {
        match self {
            PlaybackState::Playing { .. } => PlaybackState::paused(self.current_position()),
            PlaybackState::Paused { .. } => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn position_advances_only_while_playing() {
        let state = PlaybackState::paused(Duration::from_millis(200)).to_playing();
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(state.current_position(), Duration::from_millis(500));

        let paused = state.to_paused();
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(paused.current_position(), Duration::from_millis(500));
        assert!(!paused.is_playing());
        assert!(paused.to_playing().is_playing());
    }
}
