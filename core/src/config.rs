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

use crate::machine_id::{calculate_machine_id, local_device_name};
use crate::protocol::{ClientType, DEFAULT_PORT};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_CLIENT_REPLY_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_CLIENT_REPLY_ATTEMPTS: u32 = 10;
pub const DEFAULT_SERVER_REPLY_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Pause between two poll cycles.
    pub poll_interval: Duration,
    /// Consecutive unanswered cycles after which a client is evicted.
    pub client_reply_attempts: u32,
    /// How long one cycle waits for each client to reply.
    pub client_reply_timeout: Duration,
    pub device_name: String,
    pub machine_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let device_name = local_device_name();
        Self {
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            client_reply_attempts: DEFAULT_CLIENT_REPLY_ATTEMPTS,
            client_reply_timeout: DEFAULT_CLIENT_REPLY_TIMEOUT,
            machine_id: calculate_machine_id(&device_name).to_string(),
            device_name,
        }
    }
}

impl ServerConfig {
    pub fn bind_endpoint(&self) -> String {
        format!("tcp://0.0.0.0:{}", self.port)
    }

    /// Port audio clients run their local control endpoint on.
    pub fn player_port(&self) -> u16 {
        self.port.wrapping_add(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub server_reply_timeout: Duration,
    pub name: String,
    pub client_type: ClientType,
    pub language: Option<String>,
    pub player_port: Option<u16>,
    pub machine_id: String,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_reply_timeout: DEFAULT_SERVER_REPLY_TIMEOUT,
            name: name.into(),
            client_type,
            language: std::env::var("LANG").ok(),
            player_port: None,
            machine_id: calculate_machine_id(&local_device_name()).to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}
