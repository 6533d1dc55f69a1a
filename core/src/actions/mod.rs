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

//! Named actions clients can invoke, and the dispatcher that runs them.
//!
//! Descriptors are static tables. Each entry carries its typed parameter list so the same data
//! validates inbound calls and generates command line arguments.

mod player_actions;
mod server_actions;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Value;
use thiserror::Error;

use crate::player::{Player, PlayerError, PlayerInterface};
use crate::protocol::{ActionReply, ClientId, ClientInfo, ProtocolError, EXPECT_REPLY_CHAR};

pub use player_actions::PLAYER_ACTIONS;
pub use server_actions::SERVER_ACTIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub parameter_type: ParameterType,
    pub required: bool,
    pub identifier: &'static str,
    pub help: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Server,
    /// Only available when a real audio backend is attached.
    Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionKind {
    Status,
    Clients,
    Pause,
    Play,
    PlayPause,
    SeekToItem,
    SeekToNext,
    SeekToPrevious,
    SeekToTime,
    SetRepeatMode,
    SetVolume,
    AddItem,
    MoveItem,
    RemoveItem,
    ClearQueue,
    ReadyToPlay,
    CancelRadio,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Action {
    pub identifier: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub parameters: &'static [Parameter],
    /// Internal actions not offered on the command line.
    pub hidden: bool,
    pub scope: ActionScope,
    pub(crate) kind: ActionKind,
}

impl Action {
    pub fn server(identifier: &str) -> Option<&'static Action> {
        SERVER_ACTIONS.iter().find(|a| a.identifier == identifier)
    }

    pub fn player(identifier: &str) -> Option<&'static Action> {
        PLAYER_ACTIONS.iter().find(|a| a.identifier == identifier)
    }

    pub fn all() -> impl Iterator<Item = &'static Action> {
        SERVER_ACTIONS.iter().chain(PLAYER_ACTIONS.iter())
    }

    /// Server actions first; player actions only when `audio_backend` is set.
    pub fn lookup(identifier: &str, audio_backend: bool) -> Option<&'static Action> {
        Action::server(identifier).or_else(|| audio_backend.then(|| Action::player(identifier)).flatten())
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Action '{action}' has no parameter '{identifier}'")]
    UnknownParameter { action: &'static str, identifier: String },
    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("Parameter '{identifier}' expects {expected:?}, got {value}")]
    InvalidParameter {
        identifier: &'static str,
        expected: ParameterType,
        value: Value,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("Result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What actions operate on. Implemented by the server.
#[async_trait]
pub trait ActionTarget: Send {
    fn player(&self) -> &Player;

    /// Connected clients, flagging `caller`.
    fn clients(&self, caller: ClientId) -> Vec<ClientInfo>;

    async fn on_client_ready_to_play(&mut self, client: ClientId, item_index: i32, item_id: &str, item_duration: Duration);

    /// Called after every action of a message, whatever its outcome.
    async fn on_action_finished(&mut self) {}
}

/// Positional parameter values of one call, read through the action's descriptors.
pub struct ActionContext<'a> {
    action: &'static Action,
    values: &'a [Value],
}

impl<'a> ActionContext<'a> {
    pub fn new(action: &'static Action, values: &'a [Value]) -> Self {
        Self { action, values }
    }

    fn lookup(&self, identifier: &str) -> Result<(&'static Parameter, Option<&'a Value>), ActionError> {
        let action = self.action;
        let index = action
            .parameters
            .iter()
            .position(|p| p.identifier == identifier)
            .ok_or_else(|| ActionError::UnknownParameter { action: action.identifier, identifier: identifier.to_string() })?;
        let value = self.values.get(index).filter(|v| !v.is_null());
        Ok((&action.parameters[index], value))
    }

    fn present(&self, identifier: &str) -> Result<Option<(&'static Parameter, &'a Value)>, ActionError> {
        match self.lookup(identifier)? {
            (parameter, Some(value)) => Ok(Some((parameter, value))),
            (parameter, None) if parameter.required => Err(ActionError::MissingParameter(parameter.identifier)),
            (_, None) => Ok(None),
        }
    }

    fn invalid(parameter: &Parameter, value: &Value) -> ActionError {
        ActionError::InvalidParameter {
            identifier: parameter.identifier,
            expected: parameter.parameter_type,
            value: value.clone(),
        }
    }

    pub fn string(&self, identifier: &str) -> Result<Option<String>, ActionError> {
        let Some((parameter, value)) = self.present(identifier)? else {
            return Ok(None);
        };
        match value {
            Value::String(s) => Ok(Some(s.clone())),
            Value::Number(_) | Value::Bool(_) => Ok(Some(value.to_string())),
            _ => Err(Self::invalid(parameter, value)),
        }
    }

    pub fn int(&self, identifier: &str) -> Result<Option<i64>, ActionError> {
        let Some((parameter, value)) = self.present(identifier)? else {
            return Ok(None);
        };
        value.as_i64().map(Some).ok_or_else(|| Self::invalid(parameter, value))
    }

    pub fn int32(&self, identifier: &str) -> Result<Option<i32>, ActionError> {
        let Some(value) = self.int(identifier)? else {
            return Ok(None);
        };
        let (parameter, raw) = self.lookup(identifier)?;
        i32::try_from(value)
            .map(Some)
            .map_err(|_| Self::invalid(parameter, raw.unwrap_or(&Value::Null)))
    }

    pub fn float(&self, identifier: &str) -> Result<Option<f64>, ActionError> {
        let Some((parameter, value)) = self.present(identifier)? else {
            return Ok(None);
        };
        value.as_f64().map(Some).ok_or_else(|| Self::invalid(parameter, value))
    }

    pub fn require_string(&self, identifier: &str) -> Result<String, ActionError> {
        self.string(identifier)?.ok_or_else(|| self.missing(identifier))
    }

    pub fn require_int(&self, identifier: &str) -> Result<i64, ActionError> {
        self.int(identifier)?.ok_or_else(|| self.missing(identifier))
    }

    pub fn require_int32(&self, identifier: &str) -> Result<i32, ActionError> {
        self.int32(identifier)?.ok_or_else(|| self.missing(identifier))
    }

    pub fn require_float(&self, identifier: &str) -> Result<f64, ActionError> {
        self.float(identifier)?.ok_or_else(|| self.missing(identifier))
    }

    fn missing(&self, identifier: &str) -> ActionError {
        match self.lookup(identifier) {
            Ok((parameter, _)) => ActionError::MissingParameter(parameter.identifier),
            Err(e) => e,
        }
    }
}

/// Runs one action on behalf of `client`.
pub async fn execute<T: ActionTarget>(
    target: &mut T,
    client: ClientId,
    action: &'static Action,
    values: &[Value],
) -> Result<Option<Value>, ActionError> {
    let context = ActionContext::new(action, values);
    match action.scope {
        ActionScope::Server => server_actions::execute(target, client, action.kind, &context).await,
        ActionScope::Player => player_actions::execute(target.player(), action.kind, &context).await,
    }
}

/// Splits `!name` into `(name, true)`.
pub fn split_expect_reply(raw: &str) -> (&str, bool) {
    match raw.strip_prefix(EXPECT_REPLY_CHAR) {
        Some(name) => (name, true),
        None => (raw, false),
    }
}

async fn run_call<T: ActionTarget>(
    target: &mut T,
    client: ClientId,
    name: &str,
    raw_params: &str,
) -> Result<Option<Value>, ActionError> {
    if name.is_empty() {
        return Err(ProtocolError::EmptyActionName.into());
    }
    let values: Vec<Value> = serde_json::from_str(raw_params).map_err(|source| ProtocolError::MalformedParameters {
        data: raw_params.to_string(),
        source,
    })?;
    let action = Action::lookup(name, target.player().is_audio_backend())
        .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;

    debug!("Performing {:?} action {} with {} from client {}", action.scope, name, raw_params, client);
    execute(target, client, action, &values).await
}

/// Executes the `(name, params)` pairs of one client message in order.
///
/// A message with fewer than two parts carries no actions. Every failing action is logged and
/// reported to the caller if it asked for a reply; the remaining actions still run.
pub async fn dispatch<T: ActionTarget>(
    target: &mut T,
    client: ClientId,
    parts: &[String],
) -> Result<Vec<ActionReply>, ProtocolError> {
    if parts.len() < 2 {
        return Ok(Vec::new());
    }
    if parts.len() % 2 != 0 {
        return Err(ProtocolError::OddPartCount(parts.len()));
    }

    let mut replies = Vec::new();
    for pair in parts.chunks_exact(2) {
        let (name, expects_reply) = split_expect_reply(&pair[0]);
        let raw_params = pair[1].as_str();

        let outcome = run_call(target, client, name, raw_params).await;
        target.on_action_finished().await;
        match outcome {
            Ok(result) => {
                if expects_reply {
                    replies.push(ActionReply::success(result));
                }
            }
            Err(e) => {
                let message = format!("Executing action {}({}) failed", name, raw_params);
                match e {
                    ActionError::Player(_) => error!("{}: {}", message, e),
                    _ => warn!("{}: {}", message, e),
                }
                if expects_reply {
                    replies.push(ActionReply::failure(message, Some(e.to_string())));
                }
            }
        }
    }
    Ok(replies)
}
