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

// Serves a headless player on a local port and drives it through a client.
use std::time::Duration;

use anyhow::Result;
use log::info;
use serde_json::json;
use spms_core::protocol::ClientType;
use spms_core::transport::ZmqRouter;
use spms_core::{spawn_server, ActionCall, ClientConfig, ServerConfig, ServerPush, SpMs, SpMsClient};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = ServerConfig { port: 3993, ..ServerConfig::default() };
    let router = ZmqRouter::bind(&config.bind_endpoint()).await?;
    let server = spawn_server(SpMs::headless(router, config));

    let client_config = ClientConfig { port: 3993, ..ClientConfig::new("local-session", ClientType::CommandLine) };
    let (mut client, handshake) = SpMsClient::connect_tcp(&client_config, &[]).await?;
    info!("Connected to {} at api version {}", handshake.device_name, handshake.spms_api_version);

    let mut pending = vec![
        ActionCall::new("addItem", vec![json!("first")]),
        ActionCall::new("addItem", vec![json!("second")]),
        ActionCall::with_reply("status", vec![]),
    ];
    for _ in 0..20 {
        match client.next_push(client.server_reply_timeout()).await? {
            Some(ServerPush::Events(events)) => {
                for event in events {
                    info!("Event {}: {}", event.event_id, event.event);
                }
                client.answer(&pending).await?;
                pending.clear();
            }
            Some(ServerPush::Replies(replies)) => info!("Replies: {}", serde_json::to_string(&replies)?),
            None => break,
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    client.disconnect().await;
    server.shutdown().await??;
    Ok(())
}
