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

use log::{debug, info};
use spms_core::transport::ZmqRouter;
use spms_core::{spawn_server, SpMs};

use crate::cli::ServerArgs;

pub async fn shutdown_signal() {
    debug!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C signal, exiting..."),
        Err(e) => {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the server with a headless player until Ctrl+C or a transport failure.
pub async fn serve(args: &ServerArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    let router = ZmqRouter::bind(&config.bind_endpoint()).await?;
    info!(
        "Serving as {} ({}) on {}",
        config.device_name,
        config.machine_id,
        router.endpoint()
    );

    let mut service = spawn_server(SpMs::headless(router, config));
    let result = tokio::select! {
        finished = service.finished() => finished,
        _ = shutdown_signal() => {
            debug!("Shutting down server");
            service.shutdown().await
        }
    };

    result??;
    debug!("Server exited");
    Ok(())
}
