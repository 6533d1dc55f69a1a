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

use serde_json::Value;

use super::{Action, ActionContext, ActionError, ActionKind, ActionScope};
use crate::player::{Player, PlayerInterface};

pub static PLAYER_ACTIONS: &[Action] = &[Action {
    identifier: "cancelRadio",
    name: "Cancel radio",
    help: "Stop the backend from continuing the queue with generated items",
    parameters: &[],
    hidden: false,
    scope: ActionScope::Player,
    kind: ActionKind::CancelRadio,
}];

pub(super) async fn execute(player: &Player, kind: ActionKind, _context: &ActionContext<'_>) -> Result<Option<Value>, ActionError> {
    match kind {
        ActionKind::CancelRadio => player.cancel_radio().await?,
        other => return Err(ActionError::UnknownAction(format!("{:?}", other))),
    }
    Ok(None)
}
