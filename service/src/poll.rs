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

use std::future::Future;

use log::{debug, info};
use spms_core::protocol::ClientType;
use spms_core::{ClientError, ServerPush, SpMsClient};

use crate::cli::ConnectionArgs;

/// Registers as a command line client and prints every event as one JSON line until `stop` resolves.
pub async fn poll_events(connection: &ConnectionArgs, stop: impl Future<Output = ()>) -> anyhow::Result<()> {
    let config = connection.to_config(ClientType::CommandLine);
    let (mut client, handshake) = SpMsClient::connect_tcp(&config, &[]).await?;
    info!("Connected to {} on {}", handshake.name, handshake.device_name);
    println!("{}", serde_json::to_string(&handshake.server_state)?);

    let timeout = client.server_reply_timeout();
    tokio::pin!(stop);
    loop {
        let push = tokio::select! {
            _ = &mut stop => break,
            push = client.next_push(timeout) => push?,
        };
        match push {
            Some(ServerPush::Events(events)) => {
                for event in &events {
                    println!("{}", serde_json::to_string(event)?);
                }
                client.answer(&[]).await?;
            }
            Some(ServerPush::Replies(replies)) => debug!("Ignoring {} action replies", replies.len()),
            None => return Err(ClientError::Timeout(timeout).into()),
        }
    }

    client.disconnect().await;
    Ok(())
}
