//! Headless client for poking a running server: registers (optionally),
//! logs in, walks in a circle around its spawn and attacks periodically.

use clap::Parser;
use log::{info, warn};
use shared::codec::{self, DEFAULT_MAX_FRAME_LEN};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value = "5555")]
    port: u16,
    #[clap(short, long, default_value = "bot")]
    username: String,
    #[clap(long, default_value = "botpass")]
    password: String,
    /// Register the account before logging in
    #[clap(long)]
    register: bool,
    /// How long to play, in seconds
    #[clap(short, long, default_value = "10")]
    duration: u64,
    /// Radius of the walking circle in world units
    #[clap(long, default_value = "30")]
    radius: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", stream.peer_addr()?);
    let (mut reader, mut writer) = stream.into_split();

    if args.register {
        let request = ClientMessage::Register {
            username: args.username.clone(),
            password: args.password.clone(),
        };
        codec::write_message(&mut writer, &request).await?;
        let reply: ServerMessage = codec::read_message(&mut reader, DEFAULT_MAX_FRAME_LEN).await?;
        info!("Register: {:?}", reply);
    }

    let request = ClientMessage::Login {
        username: args.username.clone(),
        password: args.password.clone(),
    };
    codec::write_message(&mut writer, &request).await?;

    let (id, spawn_x, spawn_y) = match read_login(&mut reader).await? {
        Some(admitted) => admitted,
        None => return Ok(()),
    };
    info!("Logged in as player {} at ({}, {})", id, spawn_x, spawn_y);

    let listener = tokio::spawn(log_events(reader, id));

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut ticker = interval(Duration::from_millis(100));
    let mut step: u32 = 0;

    while Instant::now() < deadline {
        ticker.tick().await;
        step += 1;

        let angle = step as f64 * 0.1;
        let position = ClientMessage::Move {
            x: spawn_x + args.radius * angle.cos(),
            y: spawn_y + args.radius * angle.sin(),
        };
        codec::write_message(&mut writer, &position).await?;

        if step % 10 == 0 {
            codec::write_message(&mut writer, &ClientMessage::Attack { x: None, y: None }).await?;
        }
    }

    info!("Done, disconnecting");
    drop(writer);
    sleep(Duration::from_millis(100)).await;
    listener.abort();
    Ok(())
}

/// Reads the login reply sequence. Returns `None` if the login was refused.
async fn read_login(
    reader: &mut OwnedReadHalf,
) -> Result<Option<(u32, f64, f64)>, Box<dyn std::error::Error>> {
    match codec::read_message::<_, ServerMessage>(reader, DEFAULT_MAX_FRAME_LEN).await? {
        ServerMessage::LoginResult { success: true, .. } => {}
        ServerMessage::LoginResult { message, .. } => {
            warn!("Login refused: {}", message);
            return Ok(None);
        }
        other => return Err(format!("unexpected reply to login: {other:?}").into()),
    }

    match codec::read_message::<_, ServerMessage>(reader, DEFAULT_MAX_FRAME_LEN).await? {
        ServerMessage::MapData { seed } => info!("Map seed {}", seed),
        other => return Err(format!("expected map_data, got {other:?}").into()),
    }

    match codec::read_message::<_, ServerMessage>(reader, DEFAULT_MAX_FRAME_LEN).await? {
        ServerMessage::PlayerId { id, x, y } => Ok(Some((id, x, y))),
        other => Err(format!("expected player_id, got {other:?}").into()),
    }
}

async fn log_events(mut reader: OwnedReadHalf, own_id: u32) {
    let mut states: u64 = 0;
    loop {
        let message = match codec::read_message::<_, ServerMessage>(&mut reader, DEFAULT_MAX_FRAME_LEN).await {
            Ok(message) => message,
            Err(e) => {
                info!("Stopped reading: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::GameState { players } => {
                states += 1;
                if states % 30 == 0 {
                    let health = players.get(&own_id).map(|me| me.health);
                    info!("{} player(s) online, own health {:?}", players.len(), health);
                }
            }
            ServerMessage::AttackEvent(event) => info!(
                "Player {} hit {} for {} ({} left{})",
                event.attacker_id,
                event.target_id,
                event.damage,
                event.remaining_health,
                if event.killed { ", killed" } else { "" }
            ),
            other => info!("Received {:?}", other),
        }
    }
}
