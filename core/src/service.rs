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

use log::error;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

use crate::server::SpMs;
use crate::transport::{RouterTransport, TransportError};

/// A handle passed to background tasks that lets them observe a stop/shutdown request.
pub struct StopHandle {
    shutdown_rx: oneshot::Receiver<()>,
}

impl StopHandle {
    fn new(shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self { shutdown_rx }
    }

    /// Resolves once shutdown is requested or the owning [`ServiceHandle`] is dropped.
    ///
    /// Cancel safe, so it can sit in a `select!` loop.
    ///
    /// # Example
    /// ```rust
    /// use spms_core::spawn_service;
    ///
    /// async fn run_service() {
    ///     let service_handle = spawn_service(move |mut stop_handle| async move {
    ///         stop_handle.signaled().await;
    ///         println!("Shutdown signal received!");
    ///     });
    ///     service_handle.shutdown().await.unwrap();
    /// }
    /// ```
    pub async fn signaled(&mut self) {
        (&mut self.shutdown_rx).await.unwrap_or_default();
    }
}

/// A handle for a background task that supports cooperative shutdown and abort.
pub struct ServiceHandle<T = ()> {
    join: JoinHandle<T>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl<T> ServiceHandle<T> {
    pub fn new(join: JoinHandle<T>, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self { join, shutdown_tx: Some(shutdown_tx) }
    }

    /// Request cooperative shutdown signal without awaiting task completion.
    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Waits for the task to finish on its own. Must not be awaited again once it resolved.
    pub async fn finished(&mut self) -> Result<T, JoinError> {
        (&mut self.join).await
    }

    /// Request cooperative shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<T, JoinError> {
        self.request_shutdown();
        self.join.await
    }

    /// Forcefully abort the underlying task.
    pub fn abort(self) {
        self.join.abort();
    }
}

/// Spawn a background service task with a standard stop mechanism.
///
/// The provided function receives a [`StopHandle`] to await for shutdown and runs on a Tokio task.
pub fn spawn_service<T, Fut, Func>(f: Func) -> ServiceHandle<T>
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let stop = StopHandle::new(shutdown_rx);
    let join = tokio::spawn(async move { f(stop).await });
    ServiceHandle::new(join, shutdown_tx)
}

/// Runs `server` in the background until shutdown or a transport failure, then releases it.
pub fn spawn_server<T>(mut server: SpMs<T>) -> ServiceHandle<Result<(), TransportError>>
where
    T: RouterTransport + 'static,
{
    spawn_service(move |mut stop| async move {
        let result = server.run(&mut stop).await;
        if let Err(e) = &result {
            error!("SpMs stopped: {}", e);
        }
        server.release().await;
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ServerConfig;
    use crate::protocol::{ClientHandshake, ClientType};
    use crate::transport::memory::MemoryRouter;
    use crate::transport::DealerTransport;

    #[tokio::test]
    async fn shutdown_returns_the_task_output() {
        let handle = spawn_service(|mut stop| async move {
            stop.signaled().await;
            7
        });
        assert_eq!(handle.shutdown().await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_server_answers_handshakes_until_shut_down() {
        let router = MemoryRouter::new();
        let mut dealer = router.connector().connect("cli");
        let config = ServerConfig {
            device_name: "test-device".into(),
            machine_id: "test-machine".into(),
            ..ServerConfig::default()
        };
        let handle = spawn_server(SpMs::headless(router, config));

        let handshake = ClientHandshake {
            name: "cli".into(),
            client_type: ClientType::CommandLineAction,
            machine_id: "m".into(),
            language: None,
            player_port: None,
            actions: None,
        };
        dealer.send(&[serde_json::to_string(&handshake).unwrap()]).await.unwrap();
        let reply = dealer.recv(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(reply[0].contains("test-device"));

        assert!(handle.shutdown().await.unwrap().is_ok());
    }
}
