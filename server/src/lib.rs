//! # World Server Library
//!
//! This library provides the authoritative server for the tile-map brawler.
//! It owns the canonical player state, authenticates accounts against a
//! persistent credential store, resolves melee combat, and streams the world
//! to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authentication
//! New connections must register or log in before they can act. Accounts
//! live in a credential store with hashed passwords, and each username may
//! hold at most one live session at a time.
//!
//! ### Authoritative State
//! Every admitted player has a server-side record: position, health and
//! attack cooldown. Clients report their own positions, which are applied
//! as sent; combat outcomes are decided here alone.
//!
//! ### State Broadcasting
//! At a fixed rate (30Hz by default) the server snapshots every player and
//! sends the same `game_state` message to all admitted connections.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Each accepted TCP connection runs in its own tokio task: first the
//! register/login exchange, then a read loop for the admitted player. A
//! second task per connection drains a bounded queue of encoded frames into
//! the socket, so no task ever blocks on another client's socket.
//!
//! ### Single Registry Guard
//! All shared state sits behind one async mutex in [`registry::PlayerRegistry`].
//! Multi-step operations (admission, attack resolution) run inside a single
//! critical section, and no network I/O happens while the guard is held.
//!
//! ### Length-Prefixed JSON
//! Messages are JSON objects framed by a 4-byte big-endian length, as
//! implemented by the `shared` crate's codec.
//!
//! ## Module Organization
//!
//! ### Authentication Module (`auth`)
//! Validates registrations, verifies logins and admits players atomically.
//!
//! ### Broadcast Module (`broadcast`)
//! The periodic snapshot task.
//!
//! ### Combat Module (`combat`)
//! Cooldowns, area damage, deaths and respawns.
//!
//! ### Connection Module (`connection`)
//! The per-connection state machine and outbound writer.
//!
//! ### Credentials Module (`credentials`)
//! The credential store trait with in-memory and redb-backed implementations.
//!
//! ### Network Module (`network`)
//! Binds the listener and wires the tasks together.
//!
//! ### Registry Module (`registry`)
//! Players, connection bindings and active sessions.
//!
//! ### World Module (`world`)
//! The generated tile map and spawn placement.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::credentials::RedbCredentialStore;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedbCredentialStore::open("data/users.redb")?;
//!     let server = Server::bind(ServerConfig::default(), store).await?;
//!
//!     // Accepts connections and broadcasts until the process is stopped.
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broadcast;
pub mod combat;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod network;
pub mod registry;
pub mod world;
