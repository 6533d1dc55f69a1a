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

//! Self-clocked player used when no audio backend is available.
//!
//! The player keeps the queue and a position clock, learns item durations from a
//! [`DurationProvider`] and schedules item completion itself.

mod playback_state;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::duration::DurationProvider;
use crate::player::{PlayerError, PlayerInterface};
use crate::player_events::{PlayerEvent, PlayerEventEmitter};
use crate::player_state::{PlayerStatus, RepeatMode, ServerState};
use crate::readiness::ReadinessBarrier;
use playback_state::PlaybackState;

pub struct HeadlessPlayer {
    core: Arc<HeadlessCore>,
}

struct HeadlessCore {
    inner: Mutex<PlaybackInner>,
    events: PlayerEventEmitter,
    barrier: ReadinessBarrier,
    durations: Arc<dyn DurationProvider>,
}

struct PlaybackInner {
    status: PlayerStatus,
    playback: PlaybackState,
    current_item_index: i32,
    queue: Vec<String>,
    repeat_mode: RepeatMode,
    volume: f64,
    /// Parent of the tokens handed to background playback tasks. Cancelled on every stop.
    playback_scope: CancellationToken,
}

impl HeadlessPlayer {
    pub fn new(events: PlayerEventEmitter, barrier: ReadinessBarrier, durations: Arc<dyn DurationProvider>) -> Self {
        let inner = PlaybackInner {
            status: PlayerStatus::Idle,
            playback: PlaybackState::default(),
            current_item_index: -1,
            queue: Vec::new(),
            repeat_mode: RepeatMode::None,
            volume: 1.0,
            playback_scope: CancellationToken::new(),
        };
        Self {
            core: Arc::new(HeadlessCore { inner: Mutex::new(inner), events, barrier, durations }),
        }
    }

    async fn session<T>(&self, f: impl FnOnce(&mut Session<'_>) -> T) -> T {
        let mut inner = self.core.inner.lock().await;
        let mut session = Session::new(&self.core, &mut inner, false);
        f(&mut session)
    }
}

impl std::fmt::Debug for HeadlessPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HeadlessPlayer()")
    }
}

impl HeadlessCore {
    /// Waits for the duration of an item started in the buffering state, then starts the clock.
    /// Returns the item duration and the time left to play.
    async fn finish_buffering(self: &Arc<Self>, item_id: &str, token: &CancellationToken) -> Option<(Duration, Duration)> {
        debug!("HeadlessPlayer: waiting for duration of {}", item_id);
        let resolved = tokio::select! {
            _ = token.cancelled() => return None,
            duration = self.durations.resolve(item_id) => duration,
        };
        let Some(duration) = resolved else {
            warn!("HeadlessPlayer: duration of {} cannot be resolved", item_id);
            return None;
        };

        let mut inner = self.inner.lock().await;
        if token.is_cancelled() {
            return None;
        }
        let mut session = Session::new(self, &mut inner, true);
        session.set_status(PlayerStatus::Ready);
        session.inner.playback = session.inner.playback.to_playing();
        session.emit(PlayerEvent::property_changed("is_playing", true));

        Some((duration, duration.saturating_sub(session.inner.playback.current_position())))
    }

    async fn remaining_time(&self, duration: Duration, token: &CancellationToken) -> Option<Duration> {
        let inner = self.inner.lock().await;
        if token.is_cancelled() {
            return None;
        }
        Some(duration.saturating_sub(inner.playback.current_position()))
    }

    async fn run_playback(self: Arc<Self>, item_id: String, known_duration: Option<Duration>, token: CancellationToken) {
        let timing = match known_duration {
            Some(duration) => self.remaining_time(duration, &token).await.map(|remaining| (duration, remaining)),
            None => self.finish_buffering(&item_id, &token).await,
        };
        let Some((duration, remaining)) = timing else {
            return;
        };

        debug!("HeadlessPlayer: {} ends in {:?} ({:?})", item_id, remaining, duration);
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(remaining) => {}
        }

        let mut inner = self.inner.lock().await;
        if token.is_cancelled() {
            return;
        }
        let mut session = Session::new(&self, &mut inner, true);
        session.set_status(PlayerStatus::Idle);
        session.inner.playback = PlaybackState::paused(duration);
        session.emit(PlayerEvent::property_changed("is_playing", false));
        session.on_item_playback_ended();
    }
}

/// Locked view of the player. All mutations run through it while the state mutex is held.
struct Session<'a> {
    core: &'a Arc<HeadlessCore>,
    inner: &'a mut PlaybackInner,
    clientless: bool,
}

impl<'a> Session<'a> {
    fn new(core: &'a Arc<HeadlessCore>, inner: &'a mut PlaybackInner, clientless: bool) -> Self {
        Self { core, inner, clientless }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.clientless {
            self.core.events.emit_clientless(event);
        } else {
            self.core.events.emit(event);
        }
    }

    fn set_status(&mut self, status: PlayerStatus) {
        debug!("HeadlessPlayer: setting state to {:?}", status);
        self.inner.status = status;
        self.emit(PlayerEvent::property_changed("state", status.ordinal()));
    }

    fn is_running(&self) -> bool {
        self.inner.playback.is_playing() || self.inner.status == PlayerStatus::Buffering
    }

    fn current_item(&self) -> Option<&str> {
        self.item_at(self.inner.current_item_index)
    }

    fn item_at(&self, index: i32) -> Option<&str> {
        usize::try_from(index).ok().and_then(|i| self.inner.queue.get(i)).map(String::as_str)
    }

    fn cached_duration(&self, item_id: &str) -> Option<Duration> {
        self.core.durations.cached(item_id)
    }

    fn duration_ms(&self) -> i64 {
        self.current_item()
            .and_then(|item_id| self.cached_duration(item_id))
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn queue_len(&self) -> i32 {
        self.inner.queue.len() as i32
    }

    /// Maps a requested index onto the queue. Negative means the last position; past-the-end
    /// indices are rejected. With `allow_new` the position after the last item is valid.
    fn format_queue_index(&self, index: i32, allow_new: bool) -> Option<i32> {
        let max = if allow_new { self.queue_len() } else { self.queue_len() - 1 };
        if max < 0 || index > max {
            None
        } else if index < 0 {
            Some(max)
        } else {
            Some(index)
        }
    }

    /// Index of an existing item; past-the-end indices clamp to the last item.
    /// An empty queue has no item to fall back to, so the call fails without an event.
    fn existing_index(&self, index: i32) -> Result<i32, PlayerError> {
        let last = self.queue_len() - 1;
        if last < 0 {
            return Err(PlayerError::InvalidArgument(format!("index {} in an empty queue", index)));
        }
        Ok(self.format_queue_index(index.min(last), false).unwrap_or(last))
    }

    fn snapshot(&self) -> ServerState {
        ServerState {
            queue: self.inner.queue.clone(),
            state: self.inner.status,
            is_playing: self.inner.playback.is_playing(),
            current_item_index: self.inner.current_item_index,
            current_position_ms: self.inner.playback.current_position().as_millis() as i64,
            duration_ms: self.duration_ms(),
            repeat_mode: self.inner.repeat_mode,
            volume: self.inner.volume,
        }
    }

    fn on_item_transition(&self, to: i32) {
        self.emit(PlayerEvent::item_transition(to));

        if let Some(item_id) = self.item_at(to) {
            let duration_ms = self.cached_duration(item_id).map(|d| d.as_millis() as i64).unwrap_or(0);
            self.emit(PlayerEvent::property_changed("duration_ms", duration_ms));
        }
    }

    fn play(&mut self) {
        if !self.core.barrier.can_play() {
            debug!("HeadlessPlayer: play() held back by readiness barrier");
            return;
        }
        if self.is_running() {
            return;
        }

        if self.inner.current_item_index < 0 {
            if self.inner.queue.is_empty() {
                debug!("HeadlessPlayer: play() with an empty queue");
                return;
            }
            self.inner.current_item_index = 0;
            self.on_item_transition(0);
        }

        let Some(item_id) = self.current_item().map(str::to_string) else {
            return;
        };
        let known_duration = self.cached_duration(&item_id);

        match known_duration {
            Some(_) => {
                self.set_status(PlayerStatus::Ready);
                self.inner.playback = self.inner.playback.to_playing();
                self.emit(PlayerEvent::property_changed("is_playing", true));
            }
            None => {
                self.set_status(PlayerStatus::Buffering);
                self.inner.playback = self.inner.playback.to_paused();
            }
        }

        debug!("HeadlessPlayer: starting playback timer for {}", item_id);
        let token = self.inner.playback_scope.child_token();
        tokio::spawn(self.core.clone().run_playback(item_id, known_duration, token));
    }

    fn pause(&mut self) {
        if self.is_running() {
            if self.inner.status == PlayerStatus::Ready {
                self.emit(PlayerEvent::property_changed("is_playing", false));
            }
            self.stop();
        } else {
            self.set_status(PlayerStatus::Idle);
        }
    }

    fn stop(&mut self) {
        self.inner.playback_scope.cancel();
        self.inner.playback_scope = CancellationToken::new();
        self.inner.playback = self.inner.playback.to_paused();
        self.set_status(PlayerStatus::Idle);
    }

    fn modify_playback(&mut self, resume: bool, action: impl FnOnce(&mut Self)) {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        action(self);
        if resume && was_running {
            self.play();
        }
    }

    fn seek_to_time(&mut self, position_ms: i64) {
        let target = position_ms.clamp(0, self.duration_ms().max(0));
        self.modify_playback(true, |session| {
            session.inner.playback = PlaybackState::paused(Duration::from_millis(target as u64));
        });
        self.emit(PlayerEvent::seeked(target));
    }

    fn perform_seek_to_item(&mut self, index: i32) {
        self.stop();
        self.inner.playback = PlaybackState::default();
        self.inner.current_item_index = index;
        self.emit(PlayerEvent::property_changed("is_playing", false));
    }

    fn seek_to_item(&mut self, index: i32, position_ms: i64) -> Result<(), PlayerError> {
        let target = self.existing_index(index)?;
        self.perform_seek_to_item(target);
        self.seek_to_time(position_ms);
        self.on_item_transition(target);
        Ok(())
    }

    fn seek_to_next(&mut self) -> bool {
        let mut target = self.inner.current_item_index + 1;
        if target >= self.queue_len() {
            if self.inner.repeat_mode != RepeatMode::All || self.inner.queue.is_empty() {
                return false;
            }
            target = 0;
        }
        self.perform_seek_to_item(target);
        self.on_item_transition(target);
        true
    }

    fn seek_to_previous(&mut self) -> bool {
        if self.inner.current_item_index <= 0 {
            return false;
        }
        let target = self.inner.current_item_index - 1;
        self.perform_seek_to_item(target);
        self.on_item_transition(target);
        true
    }

    fn set_repeat_mode(&mut self, repeat_mode: RepeatMode) {
        self.inner.repeat_mode = repeat_mode;
        self.emit(PlayerEvent::property_changed("repeat_mode", repeat_mode.ordinal()));
    }

    fn set_volume(&mut self, volume: f64) {
        self.inner.volume = volume.clamp(0.0, 1.0);
        self.emit(PlayerEvent::property_changed("volume", self.inner.volume));
    }

    fn add_item(&mut self, item_id: &str, index: i32) -> i32 {
        let target = self.format_queue_index(index, true).unwrap_or(self.queue_len());
        self.inner.queue.insert(target as usize, item_id.to_string());

        if self.inner.queue.len() == 1 {
            self.inner.current_item_index = 0;
        } else if target < self.inner.current_item_index {
            self.inner.current_item_index += 1;
        }

        self.emit(PlayerEvent::item_added(item_id, target));

        if self.inner.queue.len() == 1 {
            self.on_item_transition(0);
        }
        target
    }

    fn move_item(&mut self, from: i32, to: i32) -> Result<(), PlayerError> {
        let (from, to) = (self.existing_index(from)?, self.existing_index(to)?);

        if from != to {
            let item = self.inner.queue.remove(from as usize);
            self.inner.queue.insert(to as usize, item);

            let current = self.inner.current_item_index;
            if from == current {
                self.inner.current_item_index = to;
            } else if from < current && to >= current {
                self.inner.current_item_index -= 1;
            } else if from > current && to <= current {
                self.inner.current_item_index += 1;
            }
        }

        self.emit(PlayerEvent::item_moved(from, to));
        Ok(())
    }

    fn remove_item(&mut self, index: i32) -> Result<(), PlayerError> {
        let target = self.existing_index(index)?;

        if self.inner.queue.len() == 1 {
            self.clear_queue();
            return Ok(());
        }

        self.inner.queue.remove(target as usize);

        let removed_current = target == self.inner.current_item_index;
        if removed_current {
            if self.inner.current_item_index == self.queue_len() {
                self.inner.current_item_index -= 1;
            }
            self.modify_playback(true, |session| session.inner.playback = PlaybackState::default());
        } else if target < self.inner.current_item_index {
            self.inner.current_item_index -= 1;
        }

        self.emit(PlayerEvent::item_removed(target));

        if removed_current {
            self.on_item_transition(self.inner.current_item_index);
        }
        Ok(())
    }

    fn clear_queue(&mut self) {
        self.stop();
        self.inner.queue.clear();
        self.inner.current_item_index = -1;
        self.inner.playback = PlaybackState::default();

        self.emit(PlayerEvent::cleared());
        self.on_item_transition(-1);
    }

    fn on_item_playback_ended(&mut self) {
        debug!("HeadlessPlayer: item playback ended");

        if self.inner.repeat_mode == RepeatMode::One {
            self.seek_to_time(0);
            self.play();
            return;
        }

        if self.inner.current_item_index + 1 >= self.queue_len() {
            if self.inner.repeat_mode == RepeatMode::All {
                if let Err(e) = self.seek_to_item(0, 0) {
                    warn!("HeadlessPlayer: cannot wrap to the first item: {}", e);
                    return;
                }
                self.play();
            } else {
                self.set_status(PlayerStatus::Ended);
            }
        } else {
            self.inner.current_item_index += 1;
            self.inner.playback = PlaybackState::default();
            self.on_item_transition(self.inner.current_item_index);
            self.play();
        }
    }
}

#[async_trait]
impl PlayerInterface for HeadlessPlayer {
    async fn get_current_state(&self) -> ServerState {
        self.session(|s| s.snapshot()).await
    }

    async fn get_item(&self, index: i32) -> Option<String> {
        self.session(|s| s.item_at(index).map(str::to_string)).await
    }

    async fn play(&self) -> Result<(), PlayerError> {
        self.session(|s| s.play()).await;
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.session(|s| s.pause()).await;
        Ok(())
    }

    async fn play_pause(&self) -> Result<(), PlayerError> {
        self.session(|s| if s.is_running() { s.pause() } else { s.play() }).await;
        Ok(())
    }

    async fn seek_to_time(&self, position_ms: i64) -> Result<(), PlayerError> {
        self.session(|s| s.seek_to_time(position_ms)).await;
        Ok(())
    }

    async fn seek_to_item(&self, index: i32, position_ms: i64) -> Result<(), PlayerError> {
        self.session(|s| s.seek_to_item(index, position_ms)).await
    }

    async fn seek_to_next(&self) -> Result<bool, PlayerError> {
        Ok(self.session(|s| s.seek_to_next()).await)
    }

    async fn seek_to_previous(&self) -> Result<bool, PlayerError> {
        Ok(self.session(|s| s.seek_to_previous()).await)
    }

    async fn set_repeat_mode(&self, repeat_mode: RepeatMode) -> Result<(), PlayerError> {
        self.session(|s| s.set_repeat_mode(repeat_mode)).await;
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<(), PlayerError> {
        if !volume.is_finite() {
            return Err(PlayerError::InvalidArgument(format!("volume {}", volume)));
        }
        self.session(|s| s.set_volume(volume)).await;
        Ok(())
    }

    async fn add_item(&self, item_id: &str, index: i32) -> Result<i32, PlayerError> {
        Ok(self.session(|s| s.add_item(item_id, index)).await)
    }

    async fn move_item(&self, from: i32, to: i32) -> Result<(), PlayerError> {
        self.session(|s| s.move_item(from, to)).await
    }

    async fn remove_item(&self, index: i32) -> Result<(), PlayerError> {
        self.session(|s| s.remove_item(index)).await
    }

    async fn clear_queue(&self) -> Result<(), PlayerError> {
        self.session(|s| s.clear_queue()).await;
        Ok(())
    }

    /// Emits the new duration if `item_id` is the current item.
    async fn on_duration_loaded(&self, item_id: &str, duration: Duration) {
        let mut inner = self.core.inner.lock().await;
        let session = Session::new(&self.core, &mut inner, false);
        if session.current_item() == Some(item_id) {
            session.emit(PlayerEvent::property_changed("duration_ms", duration.as_millis() as i64));
        }
    }

    async fn release(&self) {
        self.core.inner.lock().await.playback_scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::DurationCache;
    use crate::player_events::{PlayerEventListener, PlayerEventType};

    struct Fixture {
        player: HeadlessPlayer,
        events: PlayerEventListener,
        durations: Arc<DurationCache>,
        barrier: ReadinessBarrier,
    }

    fn fixture() -> Fixture {
        let (emitter, events) = PlayerEventEmitter::channel();
        let durations = Arc::new(DurationCache::new());
        let barrier = ReadinessBarrier::new();
        let player = HeadlessPlayer::new(emitter, barrier.clone(), durations.clone());
        Fixture { player, events, durations, barrier }
    }

    fn drain(events: &mut PlayerEventListener) -> Vec<PlayerEvent> {
        let mut out = Vec::new();
        while let Ok(Some(emitted)) = events.try_next() {
            out.push(emitted.event);
        }
        out
    }

    fn without_properties(events: Vec<PlayerEvent>) -> Vec<PlayerEvent> {
        events.into_iter().filter(|e| e.event_type != PlayerEventType::PropertyChanged).collect()
    }

    #[tokio::test]
    async fn adding_to_empty_queue_transitions_only_once() {
        let mut f = fixture();

        assert_eq!(f.player.add_item("A", -1).await.unwrap(), 0);
        assert_eq!(f.player.add_item("B", 0).await.unwrap(), 0);

        let state = f.player.get_current_state().await;
        assert_eq!(state.queue, vec!["B".to_string(), "A".to_string()]);
        assert_eq!(state.current_item_index, 0);

        assert_eq!(
            without_properties(drain(&mut f.events)),
            vec![
                PlayerEvent::item_added("A", 0),
                PlayerEvent::item_transition(0),
                PlayerEvent::item_added("B", 0),
            ]
        );
    }

    #[tokio::test]
    async fn out_of_range_add_appends() {
        let f = fixture();
        f.player.add_item("A", -1).await.unwrap();
        assert_eq!(f.player.add_item("B", 10).await.unwrap(), 1);
        assert_eq!(f.player.get_item(1).await.as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn play_with_known_duration_starts_clock() {
        let f = fixture();
        f.durations.insert("A", Duration::from_secs(10));
        f.player.add_item("A", -1).await.unwrap();

        f.player.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let state = f.player.get_current_state().await;
        assert_eq!(state.state, PlayerStatus::Ready);
        assert!(state.is_playing);
        assert_eq!(state.current_position_ms, 2500);
        assert_eq!(state.duration_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn play_with_unknown_duration_buffers_until_resolved() {
        let f = fixture();
        f.player.add_item("A", -1).await.unwrap();

        f.player.play().await.unwrap();
        let state = f.player.get_current_state().await;
        assert_eq!(state.state, PlayerStatus::Buffering);
        assert!(!state.is_playing);

        f.durations.insert("A", Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let state = f.player.get_current_state().await;
        assert_eq!(state.state, PlayerStatus::Ready);
        assert!(state.is_playing);
        assert_eq!(state.current_position_ms, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_position() {
        let f = fixture();
        f.durations.insert("A", Duration::from_secs(10));
        f.player.add_item("A", -1).await.unwrap();
        f.player.play().await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        f.player.pause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let state = f.player.get_current_state().await;
        assert!(!state.is_playing);
        assert_eq!(state.state, PlayerStatus::Idle);
        assert_eq!(state.current_position_ms, 400);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_one_restarts_the_same_item() {
        let mut f = fixture();
        f.durations.insert("A", Duration::from_millis(1000));
        f.player.add_item("A", -1).await.unwrap();
        f.player.set_repeat_mode(RepeatMode::One).await.unwrap();
        f.player.play().await.unwrap();
        drain(&mut f.events);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let events = drain(&mut f.events);
        assert!(events.contains(&PlayerEvent::seeked(0)));
        assert!(!events.iter().any(|e| e.event_type == PlayerEventType::ItemTransition));
        assert!(!events.contains(&PlayerEvent::property_changed("state", PlayerStatus::Ended.ordinal())));

        let state = f.player.get_current_state().await;
        assert!(state.is_playing);
        assert_eq!(state.current_item_index, 0);
        assert_eq!(state.current_position_ms, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_the_end_without_repeat_ends_playback() {
        let f = fixture();
        f.durations.insert("A", Duration::from_millis(1000));
        f.player.add_item("A", -1).await.unwrap();
        f.player.play().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let state = f.player.get_current_state().await;
        assert_eq!(state.state, PlayerStatus::Ended);
        assert!(!state.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn item_end_advances_to_next_item() {
        let mut f = fixture();
        f.durations.insert("A", Duration::from_millis(1000));
        f.durations.insert("B", Duration::from_millis(3000));
        f.player.add_item("A", -1).await.unwrap();
        f.player.add_item("B", -1).await.unwrap();
        f.player.play().await.unwrap();
        drain(&mut f.events);

        tokio::time::sleep(Duration::from_millis(1200)).await;

        let events = drain(&mut f.events);
        assert!(events.contains(&PlayerEvent::item_transition(1)));
        assert!(events.contains(&PlayerEvent::property_changed("duration_ms", 3000)));

        let state = f.player.get_current_state().await;
        assert_eq!(state.current_item_index, 1);
        assert!(state.is_playing);
        assert_eq!(state.current_position_ms, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_all_wraps_to_first_item() {
        let f = fixture();
        f.durations.insert("A", Duration::from_millis(1000));
        f.durations.insert("B", Duration::from_millis(1000));
        f.player.add_item("A", -1).await.unwrap();
        f.player.add_item("B", -1).await.unwrap();
        f.player.set_repeat_mode(RepeatMode::All).await.unwrap();
        f.player.seek_to_item(1, 0).await.unwrap();
        f.player.play().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let state = f.player.get_current_state().await;
        assert_eq!(state.current_item_index, 0);
        assert!(state.is_playing);
    }

    #[tokio::test]
    async fn engaged_barrier_holds_playback() {
        let f = fixture();
        f.durations.insert("A", Duration::from_secs(1));
        f.player.add_item("A", -1).await.unwrap();

        f.barrier.engage();
        f.player.play().await.unwrap();
        assert!(!f.player.get_current_state().await.is_playing);

        f.barrier.release();
        f.player.play().await.unwrap();
        assert!(f.player.get_current_state().await.is_playing);
        f.player.release().await;
    }

    #[tokio::test]
    async fn removing_the_sole_item_clears_the_queue() {
        let mut f = fixture();
        f.player.add_item("A", -1).await.unwrap();
        drain(&mut f.events);

        f.player.remove_item(0).await.unwrap();

        let events = without_properties(drain(&mut f.events));
        assert_eq!(events, vec![PlayerEvent::cleared(), PlayerEvent::item_transition(-1)]);
        assert_eq!(f.player.get_current_state().await.current_item_index, -1);
    }

    #[tokio::test]
    async fn removing_the_current_last_item_moves_back() {
        let mut f = fixture();
        for id in ["A", "B", "C"] {
            f.player.add_item(id, -1).await.unwrap();
        }
        f.player.seek_to_item(2, 0).await.unwrap();
        drain(&mut f.events);

        f.player.remove_item(2).await.unwrap();

        let events = without_properties(drain(&mut f.events));
        assert_eq!(events, vec![PlayerEvent::item_removed(2), PlayerEvent::item_transition(1)]);
        assert_eq!(f.player.get_current_state().await.current_item_index, 1);
    }

    #[tokio::test]
    async fn moving_items_keeps_current_item_tracked() {
        let f = fixture();
        for id in ["A", "B", "C"] {
            f.player.add_item(id, -1).await.unwrap();
        }
        f.player.seek_to_item(1, 0).await.unwrap();

        f.player.move_item(0, 2).await.unwrap();
        let state = f.player.get_current_state().await;
        assert_eq!(state.queue, vec!["B", "C", "A"]);
        assert_eq!(state.current_item(), Some("B"));

        f.player.move_item(0, 1).await.unwrap();
        let state = f.player.get_current_state().await;
        assert_eq!(state.current_item(), Some("B"));
        assert_eq!(state.current_item_index, 1);
    }

    #[tokio::test]
    async fn out_of_range_indices_clamp_to_the_last_item() {
        let mut f = fixture();
        for id in ["A", "B", "C"] {
            f.player.add_item(id, -1).await.unwrap();
        }
        drain(&mut f.events);

        f.player.seek_to_item(7, 0).await.unwrap();
        assert_eq!(f.player.get_current_state().await.current_item_index, 2);
        assert!(without_properties(drain(&mut f.events)).contains(&PlayerEvent::item_transition(2)));

        f.player.move_item(9, 0).await.unwrap();
        assert_eq!(without_properties(drain(&mut f.events)), vec![PlayerEvent::item_moved(2, 0)]);
        assert_eq!(f.player.get_current_state().await.queue, vec!["C", "A", "B"]);

        f.player.remove_item(5).await.unwrap();
        assert_eq!(without_properties(drain(&mut f.events)), vec![PlayerEvent::item_removed(2)]);
        assert_eq!(f.player.get_current_state().await.queue, vec!["C", "A"]);
    }

    #[tokio::test]
    async fn index_operations_on_an_empty_queue_fail() {
        let mut f = fixture();

        assert!(matches!(f.player.seek_to_item(0, 0).await, Err(PlayerError::InvalidArgument(_))));
        assert!(f.player.move_item(0, 1).await.is_err());
        assert!(f.player.remove_item(0).await.is_err());
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test]
    async fn seek_is_clamped_to_duration() {
        let mut f = fixture();
        f.durations.insert("A", Duration::from_millis(3000));
        f.player.add_item("A", -1).await.unwrap();
        drain(&mut f.events);

        f.player.seek_to_time(10_000).await.unwrap();
        f.player.seek_to_time(-5).await.unwrap();

        let seeks: Vec<PlayerEvent> =
            drain(&mut f.events).into_iter().filter(|e| e.event_type == PlayerEventType::Seeked).collect();
        assert_eq!(seeks, vec![PlayerEvent::seeked(3000), PlayerEvent::seeked(0)]);
    }

    #[tokio::test]
    async fn seek_to_next_and_previous_respect_bounds() {
        let f = fixture();
        f.player.add_item("A", -1).await.unwrap();
        f.player.add_item("B", -1).await.unwrap();

        assert!(!f.player.seek_to_previous().await.unwrap());
        assert!(f.player.seek_to_next().await.unwrap());
        assert!(!f.player.seek_to_next().await.unwrap());

        f.player.set_repeat_mode(RepeatMode::All).await.unwrap();
        assert!(f.player.seek_to_next().await.unwrap());
        assert_eq!(f.player.get_current_state().await.current_item_index, 0);
    }

    #[tokio::test]
    async fn volume_change_is_reported() {
        let mut f = fixture();
        f.player.set_volume(0.25).await.unwrap();
        assert_eq!(drain(&mut f.events), vec![PlayerEvent::property_changed("volume", 0.25)]);
        assert_eq!(f.player.get_current_state().await.volume, 0.25);
        assert!(f.player.set_volume(f64::NAN).await.is_err());
    }
}
