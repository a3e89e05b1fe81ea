//! Room session: one relay connection, one room, one peer mesh.
//!
//! [`RoomSession::start`] connects and joins, then hands the connection to a
//! driver task. The driver owns the mesh and handles one input at a time:
//! relay events, UI commands, native peer callbacks and mesh output.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use watchparty_common::{
    ChatMessage, ClientEvent, ConnectionId, MediaSource, PeerInfo, ServerEvent, SignalingError,
    UserProfile, WatchPartyError,
};
use watchparty_config::ClientConfig;

use crate::mesh::{
    MediaDevices, MeshChannels, MeshConfig, MeshEvent, PeerConnectionFactory, PeerMesh,
};
use crate::signaling::{SignalingClient, SignalingEvent};

// ---------------------------------------------------------------------------
// Commands and Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RoomCommand {
    Chat(String),
    Reaction(String),
    Buzz,
    SetHandRaised(bool),
    SetMedia { source: MediaSource, enabled: bool },
    Leave,
}

/// What the session reports to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Welcome {
        connection_id: ConnectionId,
    },
    RoomUsers(Vec<PeerInfo>),
    ChatHistory(Vec<ChatMessage>),
    UserJoined(PeerInfo),
    UserLeft(ConnectionId),
    Chat(ChatMessage),
    Reaction {
        sender: ConnectionId,
        emoji: String,
        timestamp: i64,
    },
    Buzz {
        sender: ConnectionId,
        timestamp: i64,
    },
    HandUpdate {
        connection_id: ConnectionId,
        is_raised: bool,
    },
    /// Stream, connection-state and local media notifications.
    Mesh(MeshEvent),
    ServerError(String),
    Disconnected,
}

/// Cheap handle for driving a running session.
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    async fn send(&self, command: RoomCommand) -> Result<(), SignalingError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SignalingError::Closed)
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), SignalingError> {
        self.send(RoomCommand::Chat(text.into())).await
    }

    pub async fn send_reaction(&self, emoji: impl Into<String>) -> Result<(), SignalingError> {
        self.send(RoomCommand::Reaction(emoji.into())).await
    }

    pub async fn buzz(&self) -> Result<(), SignalingError> {
        self.send(RoomCommand::Buzz).await
    }

    pub async fn set_hand_raised(&self, is_raised: bool) -> Result<(), SignalingError> {
        self.send(RoomCommand::SetHandRaised(is_raised)).await
    }

    pub async fn set_media(&self, source: MediaSource, enabled: bool) -> Result<(), SignalingError> {
        self.send(RoomCommand::SetMedia { source, enabled }).await
    }

    pub async fn leave(&self) -> Result<(), SignalingError> {
        self.send(RoomCommand::Leave).await
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct RoomSession {
    pub handle: RoomHandle,
    pub events: mpsc::Receiver<SessionEvent>,
    pub task: JoinHandle<()>,
}

impl RoomSession {
    /// Connect to the relay, join `room_id`, and start the driver.
    pub async fn start(
        config: &ClientConfig,
        profile: UserProfile,
        room_id: impl Into<String>,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<Self, WatchPartyError> {
        let room_id = room_id.into();
        let (client, inbound) = SignalingClient::connect(
            &config.server_url,
            Duration::from_secs(config.connect_timeout_secs),
        )
        .await?;

        client
            .send(ClientEvent::JoinRoom {
                room_id: room_id.clone(),
                user: profile.clone(),
            })
            .await?;
        info!(room_id = %room_id, nickname = %profile.nickname, "Joining room");

        let (mesh, channels) = PeerMesh::new(MeshConfig::from(config), factory, devices);
        let (commands_tx, commands) = mpsc::channel(64);
        let (events_tx, events) = mpsc::channel(256);

        let driver = SessionDriver {
            room_id,
            profile,
            mesh,
            outbox: client.sender(),
            events: events_tx,
        };
        let task = tokio::spawn(async move {
            driver.run(inbound, commands, channels).await;
            // Dropping the last outbox sender lets the writer flush and close.
            drop(client);
        });

        Ok(Self {
            handle: RoomHandle {
                commands: commands_tx,
            },
            events,
            task,
        })
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub(crate) struct SessionDriver {
    pub(crate) room_id: String,
    pub(crate) profile: UserProfile,
    pub(crate) mesh: PeerMesh,
    pub(crate) outbox: mpsc::Sender<ClientEvent>,
    pub(crate) events: mpsc::Sender<SessionEvent>,
}

impl SessionDriver {
    pub(crate) async fn run(
        mut self,
        mut inbound: mpsc::Receiver<SignalingEvent>,
        mut commands: mpsc::Receiver<RoomCommand>,
        mut channels: MeshChannels,
    ) {
        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(SignalingEvent::Server(event)) => self.on_server_event(event).await,
                    Some(SignalingEvent::Disconnected) | None => {
                        info!(room_id = %self.room_id, "Disconnected from relay");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(RoomCommand::Leave) | None => {
                        info!(room_id = %self.room_id, "Leaving room");
                        let _ = self.outbox.send(ClientEvent::LeaveRoom).await;
                        break;
                    }
                    Some(command) => self.on_command(command).await,
                },
                Some(event) = channels.peer_events.recv() => {
                    self.mesh.on_peer_event(event).await;
                }
                Some(event) = channels.events.recv() => {
                    self.on_mesh_event(event).await;
                }
            }
        }

        self.mesh.shutdown().await;
        while let Ok(event) = channels.events.try_recv() {
            self.on_mesh_event(event).await;
        }
        self.emit(SessionEvent::Disconnected).await;
    }

    async fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Welcome { connection_id } => {
                debug!(connection = %connection_id, "Assigned connection id");
                self.mesh.set_local_id(connection_id.clone());
                self.emit(SessionEvent::Welcome { connection_id }).await;
            }
            ServerEvent::RoomUsers { users } => {
                self.mesh.on_room_users(&users).await;
                self.emit(SessionEvent::RoomUsers(users)).await;
            }
            ServerEvent::ChatHistory { messages } => {
                self.emit(SessionEvent::ChatHistory(messages)).await;
            }
            ServerEvent::UserJoined {
                connection_id,
                user,
            } => {
                self.mesh.on_user_joined(&connection_id, &user).await;
                self.emit(SessionEvent::UserJoined(PeerInfo {
                    connection_id,
                    user,
                }))
                .await;
            }
            ServerEvent::UserLeft { connection_id } => {
                self.mesh.on_user_left(&connection_id).await;
                self.emit(SessionEvent::UserLeft(connection_id)).await;
            }
            ServerEvent::Signal { sender, signal } => {
                self.mesh.on_signal(&sender, signal).await;
            }
            ServerEvent::ChatMessage { message } => {
                self.emit(SessionEvent::Chat(message)).await;
            }
            ServerEvent::Reaction {
                sender_connection_id,
                emoji,
                timestamp,
            } => {
                self.emit(SessionEvent::Reaction {
                    sender: sender_connection_id,
                    emoji,
                    timestamp,
                })
                .await;
            }
            ServerEvent::Buzz {
                sender_connection_id,
                timestamp,
            } => {
                self.emit(SessionEvent::Buzz {
                    sender: sender_connection_id,
                    timestamp,
                })
                .await;
            }
            ServerEvent::HandUpdate {
                connection_id,
                is_raised,
            } => {
                self.emit(SessionEvent::HandUpdate {
                    connection_id,
                    is_raised,
                })
                .await;
            }
            ServerEvent::Health {
                status,
                connections,
                rooms,
            } => {
                debug!(status = %status, connections, rooms, "Relay health");
            }
            ServerEvent::Error { message } => {
                warn!(message = %message, "Relay reported an error");
                self.emit(SessionEvent::ServerError(message)).await;
            }
        }
    }

    async fn on_command(&mut self, command: RoomCommand) {
        let room_id = self.room_id.clone();
        let event = match command {
            RoomCommand::Chat(text) => ClientEvent::ChatMessage {
                room_id,
                text,
                user: Some(self.profile.clone()),
            },
            RoomCommand::Reaction(emoji) => ClientEvent::Reaction { room_id, emoji },
            RoomCommand::Buzz => ClientEvent::Buzz { room_id },
            RoomCommand::SetHandRaised(is_raised) => ClientEvent::HandToggle { room_id, is_raised },
            RoomCommand::SetMedia { source, enabled } => {
                // Failures are already reported as mesh events.
                let _ = self.mesh.set_media(source, enabled).await;
                return;
            }
            RoomCommand::Leave => return,
        };
        self.send(event).await;
    }

    async fn on_mesh_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::Signal { target, signal } => {
                self.send(ClientEvent::Signal { target, signal }).await;
            }
            other => self.emit(SessionEvent::Mesh(other)).await,
        }
    }

    async fn send(&self, event: ClientEvent) {
        if self.outbox.send(event).await.is_err() {
            debug!("Relay connection gone, dropping outbound event");
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }
}
