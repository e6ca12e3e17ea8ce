//! Server network layer: TCP connections and the session loop.

use crate::ai::fallback::choose_fallback_move;
use crate::ai::{AiDecision, MoveResolver, MoveSource};
use crate::arbiter;
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::{
    read_packet, write_packet, ConnectionId, FrameError, MoveInput, Packet, RejectReason,
    PROTOCOL_VERSION,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, RwLock};

/// Seat holder id for the AI opponent. Network ids start at 1.
pub const AI_CONNECTION_ID: ConnectionId = 0;

/// Messages sent from connection and AI tasks to the session loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        client_id: ConnectionId,
        packet: Packet,
    },
    ClientDisconnected {
        client_id: ConnectionId,
    },
    AiMoveReady {
        generation: u64,
        decision: Option<AiDecision>,
    },
    Shutdown,
}

/// Main server coordinating connections, the game session and the AI seat
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,

    resolver: Option<Arc<Mutex<MoveResolver>>>,
    /// Bumped on every reset so late AI answers for an old game are dropped.
    generation: u64,
    ai_pending: bool,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listener. The AI seat is only reserved when a resolver is given.
    pub async fn new(config: ServerConfig, resolver: Option<MoveResolver>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let mut game_state = GameState::new();
        let resolver = match (resolver, config.ai_seat) {
            (Some(resolver), Some(seat)) => {
                game_state.reserve_seat(seat, AI_CONNECTION_ID);
                info!("AI opponent plays {}", seat);
                Some(Arc::new(Mutex::new(resolver)))
            }
            _ => {
                info!("AI opponent disabled, both seats open");
                None
            }
        };

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game_state,
            resolver,
            generation: 0,
            ai_pending: false,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for asking a running server to stop.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns the task accepting new TCP connections
    fn spawn_acceptor(&mut self, listener: TcpListener) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        Self::register_connection(stream, addr, &clients, &server_tx).await;
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn register_connection(
        stream: TcpStream,
        addr: SocketAddr,
        clients: &Arc<RwLock<ClientManager>>,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (reader, mut writer) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let client_id = {
            let mut clients = clients.write().await;
            clients.add_client(addr, outgoing_tx)
        };

        match client_id {
            Some(client_id) => {
                Self::spawn_writer(client_id, writer, outgoing_rx);
                Self::spawn_reader(client_id, reader, server_tx.clone());
            }
            None => {
                warn!("Refusing {}: server full", addr);
                let response = Packet::Disconnected {
                    reason: "Server full".to_string(),
                };
                if let Err(e) = write_packet(&mut writer, &response).await {
                    debug!("Failed to notify {}: {}", addr, e);
                }
            }
        }
    }

    /// Drains the connection's outgoing queue. Ends when the client is removed.
    fn spawn_writer(
        client_id: ConnectionId,
        mut writer: OwnedWriteHalf,
        mut outgoing_rx: mpsc::UnboundedReceiver<Packet>,
    ) {
        tokio::spawn(async move {
            while let Some(packet) = outgoing_rx.recv().await {
                if let Err(e) = write_packet(&mut writer, &packet).await {
                    error!("Failed to send packet to client {}: {}", client_id, e);
                    break;
                }
            }
        });
    }

    fn spawn_reader(
        client_id: ConnectionId,
        mut reader: OwnedReadHalf,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(packet) => {
                        if server_tx
                            .send(ServerMessage::PacketReceived { client_id, packet })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(FrameError::Codec(e)) => {
                        warn!("Malformed packet from client {}: {}", client_id, e);
                    }
                    Err(FrameError::Closed) => break,
                    Err(e) => {
                        warn!("Dropping client {}: {}", client_id, e);
                        break;
                    }
                }
            }
            let _ = server_tx.send(ServerMessage::ClientDisconnected { client_id });
        });
    }

    async fn send_packet(&self, client_id: ConnectionId, packet: Packet) {
        let clients = self.clients.read().await;
        clients.send_to(client_id, packet);
    }

    async fn broadcast_packet(&self, packet: Packet) {
        let clients = self.clients.read().await;
        let delivered = clients.broadcast(&packet);
        debug!("Broadcast to {} clients", delivered);
    }

    async fn broadcast_game_state(&self) {
        self.broadcast_packet(Packet::GameState(self.game_state.snapshot()))
            .await;
    }

    async fn drop_client(&mut self, client_id: ConnectionId) {
        let removed = {
            let mut clients = self.clients.write().await;
            clients.remove_client(client_id)
        };
        if removed {
            self.game_state.release_seat(client_id);
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::PacketReceived { client_id, packet } => {
                self.handle_packet(client_id, packet).await;
            }
            ServerMessage::ClientDisconnected { client_id } => {
                self.drop_client(client_id).await;
            }
            ServerMessage::AiMoveReady {
                generation,
                decision,
            } => {
                self.handle_ai_move(generation, decision).await;
            }
            ServerMessage::Shutdown => return false,
        }
        true
    }

    async fn handle_packet(&mut self, client_id: ConnectionId, packet: Packet) {
        if let Packet::Join { client_version } = packet {
            self.handle_join(client_id, client_version).await;
            return;
        }

        let joined = {
            let clients = self.clients.read().await;
            clients.is_joined(client_id)
        };
        if !joined {
            warn!("Client {} sent {:?} before joining", client_id, packet);
            return;
        }

        match packet {
            Packet::SubmitMove(input) => self.handle_submit(client_id, input).await,
            Packet::RequestReset => self.handle_reset(client_id).await,
            Packet::Leave => {
                info!("Client {} left", client_id);
                self.drop_client(client_id).await;
            }
            other => {
                warn!("Unexpected packet type from client {}: {:?}", client_id, other);
            }
        }
    }

    async fn handle_join(&mut self, client_id: ConnectionId, client_version: u32) {
        info!("Client {} joining (version: {})", client_id, client_version);

        if client_version != PROTOCOL_VERSION {
            let response = Packet::Disconnected {
                reason: format!(
                    "Protocol version mismatch: server {}, client {}",
                    PROTOCOL_VERSION, client_version
                ),
            };
            self.send_packet(client_id, response).await;
            self.drop_client(client_id).await;
            return;
        }

        {
            let mut clients = self.clients.write().await;
            if !clients.mark_joined(client_id) {
                return;
            }
        }

        let notice = match self.game_state.assign_seat(client_id) {
            Some(seat) => Packet::SeatAssigned { seat },
            None => Packet::SpectatorAssigned,
        };
        self.send_packet(client_id, notice).await;
        self.send_packet(client_id, Packet::GameState(self.game_state.snapshot()))
            .await;
    }

    async fn handle_submit(&mut self, client_id: ConnectionId, input: MoveInput) {
        let side = self.game_state.side_to_move();
        if let Err(reason) = arbiter::authorize(self.game_state.seats(), side, client_id) {
            warn!("Client {} tried {} out of turn", client_id, input);
            self.reject(client_id, reason, input.to_string()).await;
            return;
        }

        match self.game_state.try_apply_move(&input) {
            Ok(applied) => {
                self.broadcast_packet(Packet::MoveApplied {
                    san: applied.san,
                    uci: applied.uci,
                    by: applied.mover,
                })
                .await;
                self.broadcast_game_state().await;
                self.request_ai_move();
            }
            Err(e) => {
                warn!("Client {} move {} rejected: {}", client_id, input, e);
                self.reject(client_id, RejectReason::IllegalMove, input.to_string())
                    .await;
            }
        }
    }

    /// Seated players may restart the game; spectators may not.
    async fn handle_reset(&mut self, client_id: ConnectionId) {
        if self.game_state.seat_of(client_id).is_none() {
            self.reject(client_id, RejectReason::NotYourTurn, "reset".to_string())
                .await;
            return;
        }

        info!("Client {} reset the game", client_id);
        self.reset_game().await;
    }

    async fn reset_game(&mut self) {
        self.game_state.reset();
        self.generation += 1;
        self.ai_pending = false;
        self.broadcast_game_state().await;
        self.request_ai_move();
    }

    async fn reject(&self, client_id: ConnectionId, reason: RejectReason, attempted: String) {
        self.send_packet(client_id, Packet::MoveRejected { reason, attempted })
            .await;
    }

    /// Starts an AI resolution if the AI holds the seat on turn.
    fn request_ai_move(&mut self) {
        let Some(resolver) = &self.resolver else {
            return;
        };
        if self.ai_pending || !self.game_state.is_active() {
            return;
        }
        let side = self.game_state.side_to_move();
        if self.game_state.seats().holder(side) != Some(AI_CONNECTION_ID) {
            return;
        }

        self.ai_pending = true;
        let resolver = Arc::clone(resolver);
        let context = self.game_state.ai_context();
        let generation = self.generation;
        let server_tx = self.server_tx.clone();

        debug!("Requesting AI move for {} (generation {})", side, generation);
        tokio::spawn(async move {
            let decision = resolver.lock().await.decide(&context).await;
            if server_tx
                .send(ServerMessage::AiMoveReady {
                    generation,
                    decision,
                })
                .is_err()
            {
                error!("Server loop gone before AI move arrived");
            }
        });
    }

    async fn handle_ai_move(&mut self, generation: u64, decision: Option<AiDecision>) {
        if generation != self.generation {
            debug!("Dropping AI move from generation {}", generation);
            return;
        }
        self.ai_pending = false;

        let Some(decision) = decision else {
            return;
        };
        let side = self.game_state.side_to_move();
        if arbiter::authorize(self.game_state.seats(), side, AI_CONNECTION_ID).is_err() {
            warn!("AI move {} arrived off turn", decision.token);
            return;
        }

        let mut input = MoveInput::Notation(decision.token.clone());
        if let MoveSource::Fallback { reason } = &decision.source {
            self.broadcast_packet(Packet::AiUnavailable {
                message: format!("AI unavailable ({}), playing {}", reason, decision.token),
            })
            .await;
        }

        let applied = match self.game_state.try_apply_move(&input) {
            Ok(applied) => applied,
            Err(e) => {
                error!("AI move {} failed to apply: {}", decision.token, e);
                let legal = self.game_state.legal_moves();
                let Some(fallback) = choose_fallback_move(&legal, &mut rand::thread_rng()) else {
                    return;
                };
                input = MoveInput::Notation(fallback.san_plus.clone());
                match self.game_state.try_apply_move(&input) {
                    Ok(applied) => applied,
                    Err(e) => {
                        error!("Fallback move {} failed to apply: {}", input, e);
                        return;
                    }
                }
            }
        };

        self.broadcast_packet(Packet::MoveApplied {
            san: applied.san,
            uci: applied.uci,
            by: applied.mover,
        })
        .await;
        self.broadcast_game_state().await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> io::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "server already running"))?;
        self.spawn_acceptor(listener);
        self.request_ai_move();

        info!("Server started successfully");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_message(message).await,
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                },

                _ = &mut shutdown => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                },
            }
        }

        self.broadcast_packet(Packet::Disconnected {
            reason: "Server shutting down".to_string(),
        })
        .await;
        info!("Server shutting down");
        Ok(())
    }
}
