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

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use spms_core::config::{
    DEFAULT_CLIENT_REPLY_ATTEMPTS, DEFAULT_CLIENT_REPLY_TIMEOUT, DEFAULT_HOST, DEFAULT_POLL_INTERVAL,
    DEFAULT_SERVER_REPLY_TIMEOUT,
};
use spms_core::protocol::{ClientType, DEFAULT_PORT};
use spms_core::{ClientConfig, ServerConfig};

/// Values accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level
    #[arg(short, long, value_enum, env = "SPMS_LOG_LEVEL", default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Also write the log to this file
    #[arg(long, env = "SPMS_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (the default)
    Serve,

    /// Invoke one action on a running server and print its result
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Action identifier followed by its parameters, see `spms actions`
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        action: Vec<String>,
    },

    /// Follow the server's events
    Poll {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// List the actions understood by the server
    Actions,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on
    #[arg(short, long, env = "SPMS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Pause between two poll cycles in milliseconds
    #[arg(long, env = "SPMS_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// Unanswered poll cycles after which a client is disconnected
    #[arg(long, env = "SPMS_CLIENT_REPLY_ATTEMPTS", default_value_t = DEFAULT_CLIENT_REPLY_ATTEMPTS)]
    pub client_reply_attempts: u32,

    /// How long each poll cycle waits for a client in milliseconds
    #[arg(long, env = "SPMS_CLIENT_REPLY_TIMEOUT_MS", default_value_t = DEFAULT_CLIENT_REPLY_TIMEOUT.as_millis() as u64)]
    pub client_reply_timeout_ms: u64,

    /// Name announced to clients, the host name by default
    #[arg(long, env = "SPMS_DEVICE_NAME")]
    pub device_name: Option<String>,
}

impl ServerArgs {
    pub fn to_config(&self) -> ServerConfig {
        let mut config = ServerConfig {
            port: self.port,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            client_reply_attempts: self.client_reply_attempts.max(1),
            client_reply_timeout: Duration::from_millis(self.client_reply_timeout_ms),
            ..ServerConfig::default()
        };
        if let Some(device_name) = &self.device_name {
            config.device_name = device_name.clone();
        }
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Host running the server
    #[arg(long, env = "SPMS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port the server listens on
    #[arg(short, long, env = "SPMS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// How long to wait for the server in milliseconds
    #[arg(long, env = "SPMS_SERVER_REPLY_TIMEOUT_MS", default_value_t = DEFAULT_SERVER_REPLY_TIMEOUT.as_millis() as u64)]
    pub server_reply_timeout_ms: u64,

    /// Name to announce to the server
    #[arg(long, default_value = "spms")]
    pub name: String,
}

impl ConnectionArgs {
    pub fn to_config(&self, client_type: ClientType) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            port: self.port,
            server_reply_timeout: Duration::from_millis(self.server_reply_timeout_ms),
            ..ClientConfig::new(self.name.clone(), client_type)
        }
    }
}
