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
use serde_json::Value;
use thiserror::Error;

use crate::player_state::ServerState;

pub const SPMS_API_VERSION: u32 = 0;
pub const DEFAULT_PORT: u16 = 3973;
pub const SERVER_APPLICATION_NAME: &str = "spmp-server";

/// Prefix of an action name asking the server for a reply entry.
pub const EXPECT_REPLY_CHAR: char = '!';

/// Sent in place of events when nothing is pending for a client.
pub const NO_EVENTS_MARKER: &str = "null";

/// Single-part message a client answers with when it has no actions to run.
pub const HEARTBEAT_PART: &str = " ";

/// Small integer derived from the transport identity of a peer.
pub type ClientId = i32;

/// Folds identity bytes the same way peers written against the JVM `contentHashCode` do, so ids
/// printed by either side of the connection match.
pub fn client_id_from_identity(identity: &[u8]) -> ClientId {
    identity.iter().fold(1i32, |hash, byte| hash.wrapping_mul(31).wrapping_add(*byte as i8 as i32))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientType {
    SpmpPlayer,
    SpmpStandalone,
    Player,
    CommandLine,
    Server,
    CommandLineAction,
}

impl ClientType {
    pub fn receives_events(&self) -> bool {
        !matches!(self, ClientType::CommandLineAction)
    }

    pub fn plays_audio(&self) -> bool {
        matches!(self, ClientType::SpmpPlayer | ClientType::Player)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    #[default]
    En,
    Ja,
}

impl Language {
    /// Parses codes such as `ja`, `ja_JP` or `EN`.
    pub fn from_code(code: &str) -> Option<Language> {
        let prefix = code.split('_').next().unwrap_or_default();
        match prefix.to_uppercase().as_str() {
            "EN" => Some(Language::En),
            "JA" => Some(Language::Ja),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHandshake {
    pub name: String,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    pub machine_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_port: Option<u16>,
    /// Flattened `name, params` pairs run before the handshake is answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
}

impl ClientHandshake {
    pub fn language(&self) -> Language {
        self.language.as_deref().and_then(Language::from_code).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHandshake {
    pub name: String,
    pub device_name: String,
    pub spms_api_version: u32,
    pub server_state: ServerState,
    pub machine_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_replies: Option<Vec<ActionReply>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub client_type: ClientType,
    pub language: Language,
    pub machine_id: String,
    #[serde(default)]
    pub is_caller: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ActionReply {
    pub fn success(result: Option<Value>) -> Self {
        Self { success: true, error: None, error_cause: None, result }
    }

    pub fn failure(error: String, error_cause: Option<String>) -> Self {
        Self { success: false, error: Some(error), error_cause, result: None }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(#[source] serde_json::Error),
    #[error("Message has an odd number of parts ({0})")]
    OddPartCount(usize),
    #[error("Malformed parameters '{data}': {source}")]
    MalformedParameters {
        data: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Empty action name")]
    EmptyActionName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_matches_jvm_array_hash() {
        assert_eq!(client_id_from_identity(&[]), 1);
        assert_eq!(client_id_from_identity(&[1, 2, 3]), 30817);
        // bytes are folded as signed values
        assert_eq!(client_id_from_identity(&[0xff]), 30);
    }

    #[test]
    fn client_type_capabilities() {
        assert!(ClientType::SpmpPlayer.plays_audio());
        assert!(ClientType::Player.plays_audio());
        assert!(!ClientType::CommandLine.plays_audio());
        assert!(ClientType::CommandLine.receives_events());
        assert!(!ClientType::CommandLineAction.receives_events());
    }

    #[test]
    fn handshake_parses_wire_names_and_language() {
        let handshake: ClientHandshake = serde_json::from_str(
            r#"{"name":"kitchen","type":"SPMP_PLAYER","machine_id":"m1","language":"ja_JP","player_port":3974}"#,
        )
        .unwrap();

        assert_eq!(handshake.client_type, ClientType::SpmpPlayer);
        assert_eq!(handshake.language(), Language::Ja);
        assert_eq!(handshake.player_port, Some(3974));
        assert_eq!(handshake.actions, None);
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(Language::from_code("de_DE"), None);
        let handshake = ClientHandshake {
            name: "x".into(),
            client_type: ClientType::CommandLine,
            machine_id: "m".into(),
            language: Some("de".into()),
            player_port: None,
            actions: None,
        };
        assert_eq!(handshake.language(), Language::En);
    }

    #[test]
    fn failure_reply_omits_result() {
        let reply = ActionReply::failure("Executing action x([]) failed".into(), Some("boom".into()));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, serde_json::json!({
            "success": false,
            "error": "Executing action x([]) failed",
            "error_cause": "boom"
        }));
    }
}
