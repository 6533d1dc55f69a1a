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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use tokio::time::Instant;

use crate::actions::{self, ActionTarget};
use crate::client_registry::{Client, ClientRegistry};
use crate::config::ServerConfig;
use crate::duration::DurationCache;
use crate::event_log::EventLog;
use crate::headless::HeadlessPlayer;
use crate::player::{Player, PlayerInterface};
use crate::player_events::{EmittedEvent, PlayerEventEmitter, PlayerEventListener, PlayerEventType};
use crate::player_state::PlayerStatus;
use crate::protocol::{
    client_id_from_identity, ActionReply, ClientHandshake, ClientId, ClientInfo, ClientType, Language, ProtocolError,
    ServerHandshake, NO_EVENTS_MARKER, SERVER_APPLICATION_NAME, SPMS_API_VERSION,
};
use crate::readiness::ReadinessBarrier;
use crate::service::StopHandle;
use crate::transport::{RoutedMessage, RouterTransport, TransportError};

/// Shared pieces a player implementation is built from.
#[derive(Debug, Clone)]
pub struct PlayerContext {
    pub events: PlayerEventEmitter,
    pub barrier: ReadinessBarrier,
    pub durations: Arc<DurationCache>,
}

/// The playback coordination server.
///
/// Owns the client registry and the event log. All mutation happens from [`SpMs::poll`], so
/// nothing here needs locking; only the player's own background work runs concurrently.
pub struct SpMs<T: RouterTransport> {
    transport: T,
    config: ServerConfig,
    player: Player,
    player_events: PlayerEventListener,
    barrier: ReadinessBarrier,
    durations: Arc<DurationCache>,
    clients: ClientRegistry,
    event_log: EventLog,
    /// Client whose actions are currently running. Player events are attributed to it.
    executing_client: Option<ClientId>,
}

impl<T: RouterTransport> SpMs<T> {
    /// Creates a server around the player built by `player_factory`.
    pub fn new(transport: T, config: ServerConfig, player_factory: impl FnOnce(PlayerContext) -> Player) -> Self {
        let (events, player_events) = PlayerEventEmitter::channel();
        let barrier = ReadinessBarrier::new();
        let durations = Arc::new(DurationCache::new());
        let player = player_factory(PlayerContext {
            events,
            barrier: barrier.clone(),
            durations: durations.clone(),
        });

        Self {
            transport,
            config,
            player,
            player_events,
            barrier,
            durations,
            clients: ClientRegistry::new(),
            event_log: EventLog::new(),
            executing_client: None,
        }
    }

    /// Creates a server driving a [`HeadlessPlayer`].
    pub fn headless(transport: T, config: ServerConfig) -> Self {
        Self::new(transport, config, |context| {
            Player::new(Arc::new(HeadlessPlayer::new(context.events, context.barrier, context.durations)))
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn barrier(&self) -> &ReadinessBarrier {
        &self.barrier
    }

    /// Polls until `stop` is signaled or the transport fails.
    pub async fn run(&mut self, stop: &mut StopHandle) -> Result<(), TransportError> {
        info!("SpMs polling every {:?}", self.config.poll_interval);
        loop {
            self.poll().await?;
            tokio::select! {
                biased;
                _ = stop.signaled() => {
                    info!("SpMs shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Runs one poll cycle: handles queued handshakes, then pushes to and hears from every client once.
    pub async fn poll(&mut self) -> Result<(), TransportError> {
        self.process_player_events().await;

        while let Some(message) = self.transport.recv(Duration::ZERO).await? {
            self.on_client_message(message).await?;
        }

        // Newest first, so clients connecting while we wait are not visited this cycle.
        for index in (0..self.clients.len()).rev() {
            self.poll_client(index).await?;
        }
        Ok(())
    }

    /// Stops the player's background work and closes the transport.
    pub async fn release(&mut self) {
        self.player.release().await;
        self.transport.close().await;
        info!("SpMs released");
    }

    async fn poll_client(&mut self, index: usize) -> Result<(), TransportError> {
        self.process_player_events().await;

        let Some(client) = self.clients.get_mut(index) else {
            return Ok(());
        };
        let (identity, id) = (client.identity.clone(), client.id);
        let records = self.event_log.take_for_client(id, client.event_head);
        if let Some(last) = records.last() {
            client.event_head = client.event_head.max(last.event_id);
        }

        let parts = if records.is_empty() {
            vec![NO_EVENTS_MARKER.to_string()]
        } else {
            records.iter().map(serde_json::to_string).collect::<Result<Vec<_>, _>>().unwrap_or_else(|e| {
                error!("Failed to serialize events for client {}: {}", id, e);
                vec![NO_EVENTS_MARKER.to_string()]
            })
        };
        if !records.is_empty() {
            trace!("Sending {} events to client {}", records.len(), id);
        }
        self.send_to(&identity, &parts).await?;

        let Some(reply) = self.wait_for_reply(id).await? else {
            self.on_client_missed_reply(index).await;
            return Ok(());
        };

        if let Some(client) = self.clients.get_mut(index) {
            client.failed_connection_attempts = 0;
        }
        if let Some(replies) = self.run_actions(id, &reply.parts).await {
            if !replies.is_empty() {
                match serde_json::to_string(&replies) {
                    Ok(json) => self.send_to(&identity, &[json]).await?,
                    Err(e) => error!("Failed to serialize action replies for client {}: {}", id, e),
                }
            }
        }
        Ok(())
    }

    /// Waits for a message from client `id`, handling messages from other peers meanwhile.
    async fn wait_for_reply(&mut self, id: ClientId) -> Result<Option<RoutedMessage>, TransportError> {
        let deadline = Instant::now() + self.config.client_reply_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let Some(message) = self.transport.recv(remaining).await? else {
                return Ok(None);
            };
            if client_id_from_identity(&message.identity) == id {
                return Ok(Some(message));
            }
            self.on_client_message(message).await?;
        }
    }

    async fn on_client_missed_reply(&mut self, index: usize) {
        let Some(client) = self.clients.get_mut(index) else {
            return;
        };
        client.failed_connection_attempts += 1;
        debug!("{} did not reply ({} in a row)", client, client.failed_connection_attempts);
        if client.failed_connection_attempts >= self.config.client_reply_attempts {
            self.on_client_timed_out(index).await;
        }
    }

    async fn on_client_timed_out(&mut self, index: usize) {
        let client = self.clients.remove(index);
        self.event_log.forget_client(client.id, client.event_head);
        info!(
            "{} disconnected after {} unanswered polls",
            client, client.failed_connection_attempts
        );

        if self.barrier.is_waiting()
            && client.plays_audio()
            && !client.ready_to_play
            && self.clients.all_audio_clients_ready()
        {
            info!("Remaining audio clients are ready, resuming playback");
            self.barrier.release();
            if let Err(e) = self.player.play().await {
                warn!("Failed to resume playback: {}", e);
            }
        }
    }

    /// Dispatches the actions in `parts` on behalf of `client`. `None` if the message was malformed.
    async fn run_actions(&mut self, client: ClientId, parts: &[String]) -> Option<Vec<ActionReply>> {
        self.executing_client = Some(client);
        let result = actions::dispatch(self, client, parts).await;
        self.process_player_events().await;
        self.executing_client = None;

        match result {
            Ok(replies) => Some(replies),
            Err(e) => {
                warn!("Ignoring message from client {}: {}", client, e);
                None
            }
        }
    }

    async fn on_client_message(&mut self, message: RoutedMessage) -> Result<(), TransportError> {
        let id = client_id_from_identity(&message.identity);
        if let Some(client) = self.clients.find(id) {
            debug!("Ignoring stray message from {}", client);
            return Ok(());
        }

        let Some(first) = message.parts.first() else {
            debug!("Ignoring empty message from unknown client {}", id);
            return Ok(());
        };
        let handshake: ClientHandshake = match serde_json::from_str(first) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!("Ignoring message from unknown client {}: {}", id, ProtocolError::MalformedHandshake(e));
                return Ok(());
            }
        };

        let bundled = match bundled_actions(&handshake, &message.parts) {
            Ok(bundled) => bundled,
            Err(e) => {
                warn!("Ignoring actions bundled with handshake of client {}: {}", id, e);
                None
            }
        };
        let action_replies = match bundled {
            Some(parts) => Some(self.run_actions(id, &parts).await.unwrap_or_default()),
            None => None,
        };

        let reply = ServerHandshake {
            name: SERVER_APPLICATION_NAME.to_string(),
            device_name: self.config.device_name.clone(),
            spms_api_version: SPMS_API_VERSION,
            server_state: self.player.get_current_state().await,
            machine_id: self.config.machine_id.clone(),
            action_replies,
        };
        match serde_json::to_string(&reply) {
            Ok(json) => self.send_to(&message.identity, &[json]).await?,
            Err(e) => {
                error!("Failed to serialize handshake reply: {}", e);
                return Ok(());
            }
        }

        if !handshake.client_type.receives_events() {
            debug!("Answered one-shot client {} ({})", handshake.name, id);
            return Ok(());
        }

        let info = ClientInfo {
            name: self.clients.unique_name(&handshake.name),
            client_type: handshake.client_type,
            language: handshake.language(),
            machine_id: handshake.machine_id.clone(),
            is_caller: false,
            player_port: handshake.player_port,
        };
        self.register(message.identity, info).await;
        Ok(())
    }

    async fn register(&mut self, identity: Bytes, info: ClientInfo) {
        let client = Client::new(identity, info, self.event_log.last_event_id());
        info!("Client connected: {}", client);

        let plays_audio = client.plays_audio();
        self.clients.register(client);

        if plays_audio && self.player.get_current_state().await.state == PlayerStatus::Buffering {
            debug!("Audio client joined while buffering, waiting for it");
            self.barrier.engage();
        }
    }

    async fn send_to(&mut self, identity: &Bytes, parts: &[String]) -> Result<(), TransportError> {
        match self.transport.send(identity, parts).await {
            Ok(()) => Ok(()),
            Err(e) if !e.is_fatal() => {
                warn!("Failed to send to client {}: {}", client_id_from_identity(identity), e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Logs every event the player emitted so far.
    async fn process_player_events(&mut self) {
        loop {
            match self.player_events.try_next() {
                Ok(Some(emitted)) => self.on_player_event(emitted).await,
                Ok(None) => {
                    warn!("Player event channel closed");
                    return;
                }
                Err(_) => return,
            }
        }
    }

    async fn on_player_event(&mut self, emitted: EmittedEvent) {
        let EmittedEvent { event, clientless } = emitted;

        if event.event_type == PlayerEventType::ReadyToPlay {
            if !self.barrier.is_waiting() {
                if let Err(e) = self.player.play().await {
                    warn!("Failed to start playback: {}", e);
                }
            }
            return;
        }

        let originator = if clientless { None } else { self.executing_client };
        trace!("Player event {} from {:?}", event, originator);
        if self.clients.is_empty() {
            return;
        }

        if matches!(event.event_type, PlayerEventType::ItemTransition | PlayerEventType::Seeked)
            && self.clients.mark_all_not_ready()
        {
            debug!("Waiting for audio clients after {}", event);
            self.barrier.engage();
            if let Err(e) = self.player.pause().await {
                warn!("Failed to pause for audio clients: {}", e);
            }
        }

        let recipients = self.clients.recipients_of(&event, originator);
        self.event_log.enqueue(event, originator, recipients);
    }
}

/// Actions a client sent along with its handshake, flattened to `name, params` parts.
fn bundled_actions(handshake: &ClientHandshake, parts: &[String]) -> Result<Option<Vec<String>>, ProtocolError> {
    if let Some(actions) = &handshake.actions {
        return Ok(Some(actions.clone()));
    }
    let Some(extra) = parts.get(1) else {
        return Ok(None);
    };
    let pairs: Vec<(String, Value)> =
        serde_json::from_str(extra).map_err(|source| ProtocolError::MalformedParameters { data: extra.clone(), source })?;
    let mut flattened = Vec::with_capacity(pairs.len() * 2);
    for (name, params) in pairs {
        flattened.push(name);
        flattened.push(params.to_string());
    }
    Ok(Some(flattened))
}

#[async_trait]
impl<T: RouterTransport> ActionTarget for SpMs<T> {
    fn player(&self) -> &Player {
        &self.player
    }

    fn clients(&self, caller: ClientId) -> Vec<ClientInfo> {
        let server = ClientInfo {
            name: SERVER_APPLICATION_NAME.to_string(),
            client_type: ClientType::Server,
            language: Language::En,
            machine_id: self.config.machine_id.clone(),
            is_caller: false,
            player_port: self.player.is_audio_backend().then(|| self.config.player_port()),
        };
        std::iter::once(server).chain(self.clients.infos(Some(caller))).collect()
    }

    async fn on_client_ready_to_play(&mut self, client: ClientId, item_index: i32, item_id: &str, item_duration: Duration) {
        if !self.barrier.is_waiting() {
            debug!("Client {} is ready to play {} but nothing waits for it", client, item_id);
            return;
        }
        if !self.clients.contains(client) {
            debug!("Ready to play from unknown client {}", client);
            return;
        }
        if item_duration.is_zero() {
            warn!("Client {} reported an empty duration for {}", client, item_id);
            return;
        }

        let state = self.player.get_current_state().await;
        if item_index != state.current_item_index || state.current_item() != Some(item_id) {
            info!(
                "Client {} is ready to play {} at {} but the current item is {:?} at {}",
                client,
                item_id,
                item_index,
                state.current_item(),
                state.current_item_index
            );
            return;
        }

        self.durations.insert(item_id, item_duration);
        self.player.on_duration_loaded(item_id, item_duration).await;

        let Some(ready_client) = self.clients.find_mut(client) else {
            return;
        };
        if ready_client.ready_to_play {
            return;
        }
        ready_client.ready_to_play = true;
        debug!("{} is ready to play {}", ready_client, item_id);

        let waiting = self.clients.audio_clients_not_ready().count();
        if waiting == 0 {
            info!("All audio clients are ready to play {}", item_id);
            self.barrier.release();
            if let Err(e) = self.player.play().await {
                warn!("Failed to start playback: {}", e);
            }
        } else {
            debug!("Still waiting for {} audio clients", waiting);
        }
    }

    async fn on_action_finished(&mut self) {
        self.process_player_events().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};

    use crate::client::{ActionCall, ServerPush, SpMsClient};
    use crate::config::{DEFAULT_CLIENT_REPLY_TIMEOUT, DEFAULT_POLL_INTERVAL};
    use crate::player::PlayerError;
    use crate::player_events::{EventRecord, PlayerEvent};
    use crate::player_state::{RepeatMode, ServerState};
    use crate::protocol::DEFAULT_PORT;
    use crate::transport::memory::{MemoryConnector, MemoryDealer, MemoryRouter};
    use crate::transport::DealerTransport;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            client_reply_attempts: 3,
            client_reply_timeout: DEFAULT_CLIENT_REPLY_TIMEOUT,
            device_name: "test-device".into(),
            machine_id: "test-machine".into(),
        }
    }

    fn handshake(name: &str, client_type: ClientType) -> ClientHandshake {
        ClientHandshake {
            name: name.into(),
            client_type,
            machine_id: format!("{}-machine", name),
            language: None,
            player_port: None,
            actions: None,
        }
    }

    fn headless_server() -> (SpMs<MemoryRouter>, MemoryConnector) {
        let _ = env_logger::builder().is_test(true).try_init();
        let router = MemoryRouter::new();
        let connector = router.connector();
        (SpMs::headless(router, test_config()), connector)
    }

    #[derive(Default)]
    struct PeerLog {
        events: Vec<EventRecord>,
        replies: Vec<ActionReply>,
    }

    /// Scripted client answering every push with whatever was queued through [`Peer::send`].
    struct Peer {
        id: ClientId,
        handshake: ServerHandshake,
        outbox: mpsc::UnboundedSender<Vec<ActionCall>>,
        log: Arc<Mutex<PeerLog>>,
        silent: Arc<AtomicBool>,
    }

    impl Peer {
        fn send(&self, calls: Vec<ActionCall>) {
            self.outbox.send(calls).unwrap();
        }

        fn go_silent(&self) {
            self.silent.store(true, Ordering::SeqCst);
        }

        fn events(&self) -> Vec<EventRecord> {
            self.log.lock().unwrap().events.clone()
        }

        fn replies(&self) -> Vec<ActionReply> {
            self.log.lock().unwrap().replies.clone()
        }
    }

    async fn connect(
        server: &mut SpMs<MemoryRouter>,
        connector: &MemoryConnector,
        identity: &str,
        handshake: ClientHandshake,
    ) -> Peer {
        let dealer = connector.connect(identity.to_string());
        let (outbox, mut queued) = mpsc::unbounded_channel::<Vec<ActionCall>>();
        let (handshake_tx, handshake_rx) = oneshot::channel();
        let log = Arc::new(Mutex::new(PeerLog::default()));
        let silent = Arc::new(AtomicBool::new(false));

        let (task_log, task_silent) = (log.clone(), silent.clone());
        tokio::spawn(async move {
            let (mut client, server_handshake) =
                SpMsClient::connect(dealer, &handshake, Duration::from_secs(5)).await.unwrap();
            handshake_tx.send(server_handshake).unwrap();

            while let Ok(Some(push)) = client.next_push(Duration::from_secs(3600)).await {
                match push {
                    ServerPush::Replies(replies) => task_log.lock().unwrap().replies.extend(replies),
                    ServerPush::Events(events) => {
                        task_log.lock().unwrap().events.extend(events);
                        if task_silent.load(Ordering::SeqCst) {
                            continue;
                        }
                        let calls = queued.try_recv().unwrap_or_default();
                        client.answer(&calls).await.unwrap();
                    }
                }
            }
        });

        tokio::task::yield_now().await;
        server.poll().await.unwrap();
        Peer {
            id: client_id_from_identity(identity.as_bytes()),
            handshake: handshake_rx.await.unwrap(),
            outbox,
            log,
            silent,
        }
    }

    fn ready(index: i32, item_id: &str) -> ActionCall {
        ActionCall::new("readyToPlay", vec![json!(index), json!(item_id), json!(1000)])
    }

    async fn current_state(server: &SpMs<MemoryRouter>) -> ServerState {
        server.player().get_current_state().await
    }

    #[tokio::test(start_paused = true)]
    async fn only_event_receivers_are_registered() {
        let (mut server, connector) = headless_server();

        let first = connect(&mut server, &connector, "cli-1", handshake("kitchen", ClientType::CommandLine)).await;
        let one_shot =
            connect(&mut server, &connector, "once", handshake("kitchen", ClientType::CommandLineAction)).await;
        connect(&mut server, &connector, "cli-2", handshake("kitchen ", ClientType::CommandLine)).await;

        let names: Vec<_> = server.registry().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["kitchen", "kitchen #2"]);

        assert_eq!(first.handshake.name, "spmp-server");
        assert_eq!(first.handshake.device_name, "test-device");
        assert_eq!(first.handshake.machine_id, "test-machine");
        assert_eq!(first.handshake.spms_api_version, SPMS_API_VERSION);
        assert_eq!(first.handshake.server_state.current_item_index, -1);
        assert_eq!(one_shot.handshake.action_replies, None);
    }

    #[tokio::test(start_paused = true)]
    async fn bundled_actions_are_answered_in_the_handshake() {
        let (mut server, connector) = headless_server();

        let mut shot = handshake("cli", ClientType::CommandLineAction);
        shot.actions = Some(vec!["!addItem".into(), r#"["song"]"#.into(), "!bogus".into(), "[]".into()]);
        let peer = connect(&mut server, &connector, "once", shot).await;

        let replies = peer.handshake.action_replies.clone().unwrap();
        assert_eq!(replies[0], ActionReply::success(Some(json!(0))));
        assert!(!replies[1].success);
        assert_eq!(peer.handshake.server_state.queue, vec!["song".to_string()]);
        assert!(server.registry().is_empty());
        // Nobody was registered to receive them.
        assert!(server.event_log().is_empty());
    }

    #[test]
    fn bundled_actions_come_from_field_or_second_part() {
        let mut with_field = handshake("cli", ClientType::CommandLineAction);
        with_field.actions = Some(vec!["play".into(), "[]".into()]);
        assert_eq!(
            bundled_actions(&with_field, &["{}".into()]).unwrap(),
            Some(vec!["play".to_string(), "[]".to_string()])
        );

        let plain = handshake("cli", ClientType::CommandLine);
        assert_eq!(bundled_actions(&plain, &["{}".into()]).unwrap(), None);
        assert_eq!(
            bundled_actions(&plain, &["{}".into(), r#"[["!addItem", ["a", 0]], ["play", []]]"#.into()]).unwrap(),
            Some(vec!["!addItem".to_string(), r#"["a",0]"#.to_string(), "play".to_string(), "[]".to_string()])
        );
        assert!(bundled_actions(&plain, &["{}".into(), "nope".into()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_broadcast_then_purged() {
        let (mut server, connector) = headless_server();
        let a = connect(&mut server, &connector, "a", handshake("a", ClientType::CommandLine)).await;
        let b = connect(&mut server, &connector, "b", handshake("b", ClientType::CommandLine)).await;

        a.send(vec![ActionCall::new("addItem", vec![json!("song")])]);
        server.poll().await.unwrap();
        assert!(!server.event_log().is_empty());
        assert!(b.events().is_empty());

        server.poll().await.unwrap();
        assert!(server.event_log().is_empty());

        let received = b.events();
        assert_eq!(received, a.events());
        assert_eq!(received[0].event, PlayerEvent::item_added("song", 0));
        assert_eq!(received[0].client_id, Some(a.id));
        assert!(received.windows(2).all(|w| w[0].event_id < w[1].event_id));
        assert!(received.iter().any(|r| r.event == PlayerEvent::item_transition(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_actions_are_reported_to_the_caller() {
        let (mut server, connector) = headless_server();
        let peer = connect(&mut server, &connector, "a", handshake("a", ClientType::CommandLine)).await;

        peer.send(vec![
            ActionCall::with_reply("bogus", vec![]),
            ActionCall::with_reply("clients", vec![]),
        ]);
        server.poll().await.unwrap();
        tokio::task::yield_now().await;

        let replies = peer.replies();
        assert_eq!(replies.len(), 2);
        assert!(!replies[0].success);
        assert_eq!(replies[0].error.as_deref(), Some("Executing action bogus([]) failed"));

        let clients: Vec<ClientInfo> = serde_json::from_value(replies[1].result.clone().unwrap()).unwrap();
        assert_eq!(clients[0].client_type, ClientType::Server);
        assert_eq!(clients[0].player_port, None);
        assert_eq!(clients[1].name, "a");
        assert!(clients[1].is_caller);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_waits_for_every_audio_client() {
        let (mut server, connector) = headless_server();
        let a = connect(&mut server, &connector, "a", handshake("a", ClientType::Player)).await;
        let b = connect(&mut server, &connector, "b", handshake("b", ClientType::SpmpPlayer)).await;
        let c = connect(&mut server, &connector, "c", handshake("c", ClientType::Player)).await;

        a.send(vec![ActionCall::new("addItem", vec![json!("song")]), ActionCall::new("play", vec![])]);
        server.poll().await.unwrap();
        assert!(server.barrier().is_waiting());
        assert!(!current_state(&server).await.is_playing);

        a.send(vec![ready(0, "song")]);
        b.send(vec![ready(0, "other")]);
        c.send(vec![ready(1, "song")]);
        server.poll().await.unwrap();
        assert!(server.barrier().is_waiting());
        let ready_flags: Vec<_> = server.registry().iter().map(|c| c.ready_to_play).collect();
        assert_eq!(ready_flags, vec![true, false, false]);

        b.send(vec![ready(0, "song")]);
        c.send(vec![ready(0, "song")]);
        server.poll().await.unwrap();

        assert!(!server.barrier().is_waiting());
        let state = current_state(&server).await;
        assert!(state.is_playing);
        assert_eq!(state.state, PlayerStatus::Ready);
        assert_eq!(state.duration_ms, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn evicting_the_last_unready_client_resumes_playback() {
        let (mut server, connector) = headless_server();
        let a = connect(&mut server, &connector, "a", handshake("a", ClientType::Player)).await;
        let b = connect(&mut server, &connector, "b", handshake("b", ClientType::Player)).await;

        a.send(vec![ActionCall::new("addItem", vec![json!("song")]), ActionCall::new("play", vec![])]);
        server.poll().await.unwrap();
        assert!(server.barrier().is_waiting());

        b.go_silent();
        a.send(vec![ready(0, "song")]);
        server.poll().await.unwrap();
        server.poll().await.unwrap();
        assert_eq!(server.registry().len(), 2);
        assert!(!current_state(&server).await.is_playing);

        server.poll().await.unwrap();
        assert_eq!(server.registry().len(), 1);
        assert!(server.registry().find(b.id).is_none());
        assert!(!server.barrier().is_waiting());
        assert!(current_state(&server).await.is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_garbage_is_ignored() {
        let (mut server, connector) = headless_server();
        let peer = connect(&mut server, &connector, "a", handshake("a", ClientType::CommandLine)).await;

        let mut stranger = connector.connect("stranger");
        stranger.send(&["not a handshake".to_string()]).await.unwrap();
        server.poll().await.unwrap();

        assert_eq!(server.registry().len(), 1);
        assert_eq!(stranger.recv(Duration::ZERO).await.unwrap(), None);
        assert_eq!(server.registry().find(peer.id).map(|c| c.failed_connection_attempts), Some(0));
    }

    /// Audio backend stand-in that only knows how to cancel a radio and counts play requests.
    struct RadioPlayer {
        events: PlayerEventEmitter,
        plays: Arc<AtomicUsize>,
    }

    impl RadioPlayer {
        fn new(events: PlayerEventEmitter) -> Self {
            Self { events, plays: Arc::default() }
        }
    }

    #[async_trait]
    impl PlayerInterface for RadioPlayer {
        async fn get_current_state(&self) -> ServerState {
            ServerState::default()
        }
        async fn play(&self) -> Result<(), PlayerError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn pause(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn play_pause(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn seek_to_time(&self, _position_ms: i64) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn seek_to_item(&self, _index: i32, _position_ms: i64) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn seek_to_next(&self) -> Result<bool, PlayerError> {
            Ok(false)
        }
        async fn seek_to_previous(&self) -> Result<bool, PlayerError> {
            Ok(false)
        }
        async fn set_repeat_mode(&self, _repeat_mode: RepeatMode) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn add_item(&self, _item_id: &str, _index: i32) -> Result<i32, PlayerError> {
            Ok(0)
        }
        async fn move_item(&self, _from: i32, _to: i32) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn remove_item(&self, _index: i32) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn clear_queue(&self) -> Result<(), PlayerError> {
            Ok(())
        }
        async fn cancel_radio(&self) -> Result<(), PlayerError> {
            self.events.emit(PlayerEvent::cancel_radio());
            Ok(())
        }
        fn is_audio_backend(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_radio_is_not_echoed_to_its_sender() {
        let router = MemoryRouter::new();
        let connector = router.connector();
        let mut server = SpMs::new(router, test_config(), |context| Player::new(Arc::new(RadioPlayer::new(context.events))));

        let a = connect(&mut server, &connector, "a", handshake("a", ClientType::CommandLine)).await;
        let b = connect(&mut server, &connector, "b", handshake("b", ClientType::CommandLine)).await;

        a.send(vec![ActionCall::new("cancelRadio", vec![]), ActionCall::with_reply("clients", vec![])]);
        server.poll().await.unwrap();
        server.poll().await.unwrap();

        assert!(a.events().is_empty());
        let received = b.events();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event, PlayerEvent::cancel_radio());
        assert_eq!(received[0].client_id, Some(a.id));
        assert!(server.event_log().is_empty());

        let clients: Vec<ClientInfo> = serde_json::from_value(a.replies()[0].result.clone().unwrap()).unwrap();
        assert_eq!(clients[0].player_port, Some(DEFAULT_PORT + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_to_play_starts_playback_without_being_logged() {
        let router = MemoryRouter::new();
        let connector = router.connector();
        let mut emitter = None;
        let mut plays = None;
        let mut server = SpMs::new(router, test_config(), |context| {
            let player = RadioPlayer::new(context.events.clone());
            emitter = Some(context.events);
            plays = Some(player.plays.clone());
            Player::new(Arc::new(player))
        });
        let (emitter, plays) = (emitter.unwrap(), plays.unwrap());
        let peer = connect(&mut server, &connector, "a", handshake("a", ClientType::CommandLine)).await;

        emitter.emit(PlayerEvent::ready_to_play());
        server.poll().await.unwrap();
        assert_eq!(plays.load(Ordering::SeqCst), 1);
        assert!(server.event_log().is_empty());

        server.barrier().engage();
        emitter.emit_clientless(PlayerEvent::ready_to_play());
        server.poll().await.unwrap();
        assert_eq!(plays.load(Ordering::SeqCst), 1);
        assert!(server.event_log().is_empty());
        assert!(peer.events().is_empty());
    }

    async fn send_handshake(dealer: &mut MemoryDealer, name: &str) {
        let json = serde_json::to_string(&handshake(name, ClientType::CommandLine)).unwrap();
        dealer.send(&[json]).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_handshake_from_a_known_client_is_ignored() {
        let (mut server, connector) = headless_server();
        let mut dealer = connector.connect("a");
        send_handshake(&mut dealer, "kitchen").await;
        server.poll().await.unwrap();

        let first = dealer.recv(Duration::ZERO).await.unwrap().unwrap();
        assert!(serde_json::from_str::<ServerHandshake>(&first[0]).is_ok());
        assert_eq!(dealer.recv(Duration::ZERO).await.unwrap(), Some(vec![NO_EVENTS_MARKER.to_string()]));
        let id = client_id_from_identity(b"a");
        let head = server.registry().find(id).unwrap().event_head;

        send_handshake(&mut dealer, "bathroom").await;
        server.poll().await.unwrap();

        assert_eq!(server.registry().len(), 1);
        let client = server.registry().find(id).unwrap();
        assert_eq!(client.name(), "kitchen");
        assert_eq!(client.event_head, head);
        // Only the regular push, no second handshake reply.
        assert_eq!(dealer.recv(Duration::ZERO).await.unwrap(), Some(vec![NO_EVENTS_MARKER.to_string()]));
        assert_eq!(dealer.recv(Duration::ZERO).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn client_joining_mid_cycle_is_polled_next_cycle() {
        let (mut server, connector) = headless_server();
        let mut old = connector.connect("old");
        send_handshake(&mut old, "old").await;

        let mut newcomer = connector.connect("new");
        let joining = tokio::spawn(async move {
            // Lands while the server waits for the reply of "old".
            tokio::time::sleep(DEFAULT_CLIENT_REPLY_TIMEOUT / 2).await;
            send_handshake(&mut newcomer, "new").await;
            newcomer
        });

        server.poll().await.unwrap();
        let mut newcomer = joining.await.unwrap();
        assert_eq!(server.registry().len(), 2);
        assert_eq!(old.recv(Duration::ZERO).await.unwrap().map(|parts| parts.len()), Some(1));
        assert_eq!(old.recv(Duration::ZERO).await.unwrap(), Some(vec![NO_EVENTS_MARKER.to_string()]));

        let greeting = newcomer.recv(Duration::ZERO).await.unwrap().unwrap();
        assert!(serde_json::from_str::<ServerHandshake>(&greeting[0]).is_ok());
        assert_eq!(newcomer.recv(Duration::ZERO).await.unwrap(), None);

        server.poll().await.unwrap();
        assert_eq!(newcomer.recv(Duration::ZERO).await.unwrap(), Some(vec![NO_EVENTS_MARKER.to_string()]));
    }
}
