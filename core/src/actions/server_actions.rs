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

use serde_json::Value;

use super::{Action, ActionContext, ActionError, ActionKind, ActionScope, ActionTarget, Parameter, ParameterType};
use crate::player::PlayerInterface;
use crate::player_state::RepeatMode;
use crate::protocol::ClientId;

const fn param(parameter_type: ParameterType, required: bool, identifier: &'static str, help: &'static str) -> Parameter {
    Parameter { parameter_type, required, identifier, help }
}

const fn action(
    kind: ActionKind,
    identifier: &'static str,
    name: &'static str,
    help: &'static str,
    parameters: &'static [Parameter],
) -> Action {
    Action { identifier, name, help, parameters, hidden: false, scope: ActionScope::Server, kind }
}

pub static SERVER_ACTIONS: &[Action] = &[
    action(ActionKind::Status, "status", "Get status", "Print the current status of the server's player", &[]),
    action(ActionKind::Clients, "clients", "Get clients", "List the clients connected to the server", &[]),
    action(ActionKind::Pause, "pause", "Pause", "Pause playback", &[]),
    action(ActionKind::Play, "play", "Play", "Resume playback", &[]),
    action(ActionKind::PlayPause, "playPause", "Play/pause", "Toggle playback between playing and paused", &[]),
    action(
        ActionKind::SeekToItem,
        "seekToItem",
        "Seek to item",
        "Jump to an item in the queue",
        &[
            param(ParameterType::Int, true, "index", "Queue index of the item to seek to"),
            param(ParameterType::Int, false, "position_ms", "Position within the item in milliseconds"),
        ],
    ),
    action(ActionKind::SeekToNext, "seekToNext", "Seek to next", "Jump to the next item in the queue", &[]),
    action(
        ActionKind::SeekToPrevious,
        "seekToPrevious",
        "Seek to previous",
        "Jump to the previous item, or restart the current one",
        &[param(
            ParameterType::Int,
            false,
            "repeat_threshold_ms",
            "Restart the current item instead when this far into it (0 always restarts)",
        )],
    ),
    action(
        ActionKind::SeekToTime,
        "seekToTime",
        "Seek to time",
        "Seek within the current item",
        &[param(ParameterType::Int, true, "position_ms", "Target position in milliseconds")],
    ),
    action(
        ActionKind::SetRepeatMode,
        "setRepeatMode",
        "Set repeat mode",
        "Set the queue repeat mode",
        &[param(ParameterType::Int, true, "repeat_mode", "0 = none, 1 = one, 2 = all")],
    ),
    action(
        ActionKind::SetVolume,
        "setVolume",
        "Set volume",
        "Set the playback volume",
        &[param(ParameterType::Float, true, "volume", "Volume between 0.0 and 1.0")],
    ),
    action(
        ActionKind::AddItem,
        "addItem",
        "Add item",
        "Insert an item into the queue",
        &[
            param(ParameterType::String, true, "item_id", "ID of the item to add"),
            param(ParameterType::Int, false, "index", "Queue index to insert at (end of queue if negative)"),
        ],
    ),
    action(
        ActionKind::MoveItem,
        "moveItem",
        "Move item",
        "Move an item within the queue",
        &[
            param(ParameterType::Int, true, "from", "Current index of the item"),
            param(ParameterType::Int, true, "to", "New index of the item"),
        ],
    ),
    action(
        ActionKind::RemoveItem,
        "removeItem",
        "Remove item",
        "Remove an item from the queue",
        &[param(ParameterType::Int, true, "from", "Index of the item to remove")],
    ),
    action(ActionKind::ClearQueue, "clearQueue", "Clear queue", "Remove every item from the queue", &[]),
    Action {
        identifier: "readyToPlay",
        name: "Ready to play",
        help: "Report that the current item is buffered on this client",
        parameters: &[
            param(ParameterType::Int, true, "item_index", "Queue index of the buffered item"),
            param(ParameterType::String, true, "item_id", "ID of the buffered item"),
            param(ParameterType::Int, true, "item_duration_ms", "Measured duration of the item"),
        ],
        hidden: true,
        scope: ActionScope::Server,
        kind: ActionKind::ReadyToPlay,
    },
];

pub(super) async fn execute<T: ActionTarget>(
    target: &mut T,
    client: ClientId,
    kind: ActionKind,
    context: &ActionContext<'_>,
) -> Result<Option<Value>, ActionError> {
    let player = target.player().clone();
    match kind {
        ActionKind::Status => {
            let state = player.get_current_state().await;
            return Ok(Some(serde_json::to_value(state)?));
        }
        ActionKind::Clients => return Ok(Some(serde_json::to_value(target.clients(client))?)),
        ActionKind::Pause => player.pause().await?,
        ActionKind::Play => player.play().await?,
        ActionKind::PlayPause => player.play_pause().await?,
        ActionKind::SeekToItem => {
            let index = context.require_int32("index")?;
            let position_ms = context.int("position_ms")?.unwrap_or(0);
            player.seek_to_item(index, position_ms).await?;
        }
        ActionKind::SeekToNext => {
            player.seek_to_next().await?;
        }
        ActionKind::SeekToPrevious => {
            let threshold = context.int("repeat_threshold_ms")?.unwrap_or(-1);
            let position_ms = player.get_current_state().await.current_position_ms;
            if threshold == 0 || (threshold > 0 && position_ms >= threshold) {
                player.seek_to_time(0).await?;
            } else {
                player.seek_to_previous().await?;
            }
        }
        ActionKind::SeekToTime => player.seek_to_time(context.require_int("position_ms")?).await?,
        ActionKind::SetRepeatMode => {
            let ordinal = context.require_int("repeat_mode")?;
            let repeat_mode = RepeatMode::from_ordinal(ordinal).ok_or(ActionError::InvalidParameter {
                identifier: "repeat_mode",
                expected: ParameterType::Int,
                value: ordinal.into(),
            })?;
            player.set_repeat_mode(repeat_mode).await?;
        }
        ActionKind::SetVolume => player.set_volume(context.require_float("volume")?).await?,
        ActionKind::AddItem => {
            let item_id = context.require_string("item_id")?;
            let index = context.int32("index")?.unwrap_or(-1);
            let added_at = player.add_item(&item_id, index).await?;
            return Ok(Some(added_at.into()));
        }
        ActionKind::MoveItem => {
            let from = context.require_int32("from")?;
            let to = context.require_int32("to")?;
            player.move_item(from, to).await?;
        }
        ActionKind::RemoveItem => player.remove_item(context.require_int32("from")?).await?,
        ActionKind::ClearQueue => player.clear_queue().await?,
        ActionKind::ReadyToPlay => {
            let item_index = context.require_int32("item_index")?;
            let item_id = context.require_string("item_id")?;
            let duration_ms = context.require_int("item_duration_ms")?;
            let item_duration = Duration::from_millis(duration_ms.max(0) as u64);
            target.on_client_ready_to_play(client, item_index, &item_id, item_duration).await;
        }
        ActionKind::CancelRadio => return Err(ActionError::UnknownAction("cancelRadio".to_string())),
    }
    Ok(None)
}
