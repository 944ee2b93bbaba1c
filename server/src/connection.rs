//! Per-connection task: authenticate, then serve the admitted player.
//!
//! Before admission the task owns both socket halves and replies directly.
//! After admission the write half moves to a writer task that drains the
//! connection's outbound queue, so game traffic from other tasks never waits
//! on this socket.

use crate::auth::{Admission, Authenticator, LoginOutcome};
use crate::combat::CombatResolver;
use crate::credentials::CredentialStore;
use crate::registry::{Connection, OutboundFrame, PlayerRegistry};
use log::{debug, info, warn};
use shared::{codec, decode_client_message, ClientMessage, CodecError, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{0} message before login")]
    Unauthenticated(&'static str),
}

/// Everything a connection task needs, shared by all of them.
pub struct ConnectionContext<S: CredentialStore> {
    pub auth: Authenticator<S>,
    pub combat: CombatResolver,
    pub registry: Arc<PlayerRegistry>,
    pub max_frame_len: usize,
}

pub async fn handle_connection<S: CredentialStore>(
    stream: TcpStream,
    addr: SocketAddr,
    context: Arc<ConnectionContext<S>>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (connection, outbound) = Connection::channel(addr);

    let admission = match authenticate(&mut reader, &mut writer, &connection, &context).await {
        Ok(admission) => admission,
        Err(ConnectionError::Codec(CodecError::Closed)) => {
            info!("{} disconnected before logging in", addr);
            return;
        }
        Err(e) => {
            warn!("Closing connection from {}: {}", addr, e);
            return;
        }
    };
    drop(connection);

    let player_id = admission.player_id;
    let mut writer_task = tokio::spawn(write_outbound(writer, outbound));

    let result = tokio::select! {
        result = serve_player(&mut reader, player_id, &context) => result,
        _ = &mut writer_task => {
            debug!("Writer for player {} stopped", player_id);
            Ok(())
        }
    };

    match result {
        Ok(()) | Err(ConnectionError::Codec(CodecError::Closed)) => {}
        Err(e) => warn!("Dropping player {}: {}", player_id, e),
    }

    context.registry.remove(player_id).await;
    writer_task.abort();
}

/// Runs the register/login exchange until a login succeeds.
pub async fn authenticate<R, W, S>(
    reader: &mut R,
    writer: &mut W,
    connection: &Connection,
    context: &ConnectionContext<S>,
) -> Result<Admission, ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: CredentialStore,
{
    loop {
        let payload = codec::read_frame(reader, context.max_frame_len).await?;

        match decode_client_message(&payload)? {
            ClientMessage::Register { username, password } => {
                let reply = context.auth.register(&username, &password).await;
                codec::write_message(writer, &reply).await?;
            }
            ClientMessage::Login { username, password } => {
                match context.auth.login(&username, &password, connection.clone()).await {
                    LoginOutcome::Admitted(admission) => {
                        if let Err(e) = send_replies(writer, &admission.replies()).await {
                            context.registry.remove(admission.player_id).await;
                            return Err(e.into());
                        }
                        return Ok(admission);
                    }
                    LoginOutcome::Rejected(reason) => {
                        let reply = ServerMessage::LoginResult {
                            success: false,
                            message: reason.to_string(),
                        };
                        codec::write_message(writer, &reply).await?;
                    }
                }
            }
            ClientMessage::Attack { .. } => return Err(ConnectionError::Unauthenticated("attack")),
            ClientMessage::Move { .. } => return Err(ConnectionError::Unauthenticated("move")),
        }
    }
}

async fn send_replies<W>(writer: &mut W, replies: &[ServerMessage]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    for reply in replies {
        codec::write_message(writer, reply).await?;
    }
    Ok(())
}

/// Applies an admitted player's messages until the stream ends or breaks.
pub async fn serve_player<R, S>(
    reader: &mut R,
    player_id: u32,
    context: &ConnectionContext<S>,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    S: CredentialStore,
{
    loop {
        let payload = codec::read_frame(reader, context.max_frame_len).await?;
        let message = decode_client_message(&payload)?;

        // Positions are trusted as sent.
        if let Some((x, y)) = message.position() {
            context.registry.update_position(player_id, x, y).await;
        }

        match message {
            ClientMessage::Attack { .. } => {
                context.combat.resolve_attack(player_id).await;
            }
            ClientMessage::Register { .. } | ClientMessage::Login { .. } => {
                debug!("Ignoring auth message from player {}", player_id);
            }
            ClientMessage::Move { .. } => {}
        }
    }
}

async fn write_outbound<W>(mut writer: W, mut outbound: mpsc::Receiver<OutboundFrame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!("Write failed: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::credentials::MemoryCredentialStore;
    use crate::world::World;
    use tokio::io::duplex;

    fn context() -> ConnectionContext<MemoryCredentialStore> {
        let config = ServerConfig::ephemeral();
        let registry = Arc::new(PlayerRegistry::new());
        let world = Arc::new(World::new(config.map, config.spawn));
        ConnectionContext {
            auth: Authenticator::new(
                MemoryCredentialStore::new(),
                Arc::clone(&registry),
                Arc::clone(&world),
                config.combat.max_health,
            ),
            combat: CombatResolver::new(Arc::clone(&registry), world, config.combat),
            registry,
            max_frame_len: config.max_frame_len,
        }
    }

    fn test_connection() -> Connection {
        Connection::channel("127.0.0.1:5555".parse().unwrap()).0
    }

    fn frame(json: &str) -> Vec<u8> {
        let mut frame = (json.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(json.as_bytes());
        frame
    }

    async fn next_reply(replies: &mut &[u8]) -> ServerMessage {
        codec::read_message(replies, 1024).await.unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_register_then_login() {
        let context = context();
        let mut input = Vec::new();
        input.extend(frame(r#"{"type":"register","username":"alice","password":"secret"}"#));
        input.extend(frame(r#"{"type":"login","username":"alice","password":"nope"}"#));
        input.extend(frame(r#"{"type":"login","username":"alice","password":"secret"}"#));
        let mut reader = &input[..];
        let mut output = Vec::new();

        let admission = authenticate(&mut reader, &mut output, &test_connection(), &context)
            .await
            .unwrap();
        assert_eq!(admission.player_id, 1);

        let mut replies = &output[..];
        assert_eq!(
            next_reply(&mut replies).await,
            ServerMessage::RegisterResult {
                success: true,
                message: "Registration successful".to_string()
            }
        );
        assert_eq!(
            next_reply(&mut replies).await,
            ServerMessage::LoginResult {
                success: false,
                message: "Invalid username or password".to_string()
            }
        );
        let [login, map, id] = admission.replies();
        assert_eq!(next_reply(&mut replies).await, login);
        assert_eq!(next_reply(&mut replies).await, map);
        assert_eq!(next_reply(&mut replies).await, id);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_game_message_before_login_is_rejected() {
        let context = context();
        let input = frame(r#"{"type":"attack"}"#);
        let mut reader = &input[..];
        let mut output = Vec::new();

        let result = authenticate(&mut reader, &mut output, &test_connection(), &context).await;
        assert!(matches!(result, Err(ConnectionError::Unauthenticated("attack"))));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_rejected() {
        let context = context();
        let input = frame("{not json");
        let mut reader = &input[..];
        let mut output = Vec::new();

        let result = authenticate(&mut reader, &mut output, &test_connection(), &context).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Codec(CodecError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_serve_player_applies_moves_and_attacks() {
        let context = context();
        let (attacker, target) = {
            let mut guard = context.registry.lock().await;
            let attacker = guard.insert("alice", (0.0, 0.0), 100, test_connection()).unwrap().id;
            let target = guard.insert("bob", (1000.0, 1000.0), 100, test_connection()).unwrap().id;
            (attacker, target)
        };

        let mut input = Vec::new();
        input.extend(frame(r#"{"type":"move","x":990.0,"y":1000.0}"#));
        input.extend(frame(r#"{"x":995.0,"y":1000.0}"#));
        input.extend(frame(r#"{"type":"login","username":"x","password":"y"}"#));
        input.extend(frame(r#"{"type":"attack","x":1000.0,"y":1010.0}"#));
        let mut reader = &input[..];

        let result = serve_player(&mut reader, attacker, &context).await;
        assert!(matches!(result, Err(ConnectionError::Codec(CodecError::Closed))));

        let alice = context.registry.player(attacker).await.unwrap();
        assert_eq!((alice.x, alice.y), (1000.0, 1010.0));
        assert_eq!(context.registry.player(target).await.unwrap().health, 90);
    }

    #[tokio::test]
    async fn test_unknown_type_ends_session() {
        let context = context();
        let input = frame(r#"{"type":"teleport","x":1.0,"y":2.0}"#);
        let mut reader = &input[..];

        let result = serve_player(&mut reader, 1, &context).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Codec(CodecError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_writer_forwards_frames_in_order() {
        let (client, server) = duplex(1024);
        let (sender, receiver) = mpsc::channel(8);
        let writer = tokio::spawn(write_outbound(server, receiver));

        let first = codec::encode(&ServerMessage::MapData { seed: 1 }).unwrap();
        let second = codec::encode(&ServerMessage::MapData { seed: 2 }).unwrap();
        sender.send(first.into()).await.unwrap();
        sender.send(second.into()).await.unwrap();
        drop(sender);
        writer.await.unwrap();

        let mut client = client;
        let a: ServerMessage = codec::read_message(&mut client, 1024).await.unwrap();
        let b: ServerMessage = codec::read_message(&mut client, 1024).await.unwrap();
        assert_eq!(a, ServerMessage::MapData { seed: 1 });
        assert_eq!(b, ServerMessage::MapData { seed: 2 });
    }
}
