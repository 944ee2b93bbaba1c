//! Registration and login for connections that have not been admitted yet.
//!
//! Credential checks run on the blocking pool. Admission itself happens in a
//! single registry critical section that re-checks the active session, so two
//! concurrent logins for one username admit at most one player.

use crate::credentials::{hash_password, unix_now_secs, CredentialError, CredentialStore};
use crate::registry::{Connection, PlayerRegistry, RegistryError};
use crate::world::World;
use log::{info, warn};
use shared::ServerMessage;
use std::sync::Arc;

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 4;

const CREDENTIALS_REQUIRED: &str = "Username and password are required";
const USERNAME_TOO_SHORT: &str = "Username must be at least 3 characters";
const PASSWORD_TOO_SHORT: &str = "Password must be at least 4 characters";
const USERNAME_TAKEN: &str = "Username already exists";
const REGISTERED: &str = "Registration successful";
const REGISTER_FAILED: &str = "Server error during registration";
const ALREADY_LOGGED_IN: &str = "User already logged in";
const INVALID_CREDENTIALS: &str = "Invalid username or password";
const LOGGED_IN: &str = "Login successful";
const LOGIN_FAILED: &str = "Server error during login";

/// A player that has just been admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub player_id: u32,
    pub x: f64,
    pub y: f64,
    pub map_seed: u64,
}

impl Admission {
    /// The replies owed to the client, in the order they must be sent.
    pub fn replies(&self) -> [ServerMessage; 3] {
        [
            ServerMessage::LoginResult {
                success: true,
                message: LOGGED_IN.to_string(),
            },
            ServerMessage::MapData {
                seed: self.map_seed,
            },
            ServerMessage::PlayerId {
                id: self.player_id,
                x: self.x,
                y: self.y,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Admitted(Admission),
    /// The connection stays unauthenticated and may try again.
    Rejected(&'static str),
}

pub struct Authenticator<S: CredentialStore> {
    store: S,
    registry: Arc<PlayerRegistry>,
    world: Arc<World>,
    max_health: u32,
}

impl<S: CredentialStore> Authenticator<S> {
    pub fn new(store: S, registry: Arc<PlayerRegistry>, world: Arc<World>, max_health: u32) -> Self {
        Self {
            store,
            registry,
            world,
            max_health,
        }
    }

    /// Handles a `register` request and returns the `register_result` reply.
    /// The connection stays unauthenticated either way.
    pub async fn register(&self, username: &str, password: &str) -> ServerMessage {
        let (success, message) = match self.try_register(username, password).await {
            Ok(()) => (true, REGISTERED),
            Err(reason) => (false, reason),
        };
        ServerMessage::RegisterResult {
            success,
            message: message.to_string(),
        }
    }

    async fn try_register(&self, username: &str, password: &str) -> Result<(), &'static str> {
        if username.is_empty() || password.is_empty() {
            return Err(CREDENTIALS_REQUIRED);
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(USERNAME_TOO_SHORT);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PASSWORD_TOO_SHORT);
        }

        let name = username.to_string();
        let hash = hash_password(password);
        let created = self
            .with_store(move |store| store.create_user(&name, &hash, unix_now_secs()))
            .await;

        match created {
            Ok(record) => {
                info!("Registered user {} with id {}", record.username, record.id);
                Ok(())
            }
            Err(CredentialError::UsernameTaken) => Err(USERNAME_TAKEN),
            Err(e) => {
                warn!("Failed to register {}: {}", username, e);
                Err(REGISTER_FAILED)
            }
        }
    }

    /// Handles a `login` request. On success the player is already in the
    /// registry, bound to `connection`.
    pub async fn login(&self, username: &str, password: &str, connection: Connection) -> LoginOutcome {
        if username.is_empty() || password.is_empty() {
            return LoginOutcome::Rejected(CREDENTIALS_REQUIRED);
        }
        if self.registry.is_active(username).await {
            return LoginOutcome::Rejected(ALREADY_LOGGED_IN);
        }

        let name = username.to_string();
        let user = match self.with_store(move |store| store.find_user(&name)).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to look up {}: {}", username, e);
                return LoginOutcome::Rejected(LOGIN_FAILED);
            }
        };
        let verified = user.is_some_and(|record| record.password_hash == hash_password(password));
        if !verified {
            info!("Rejected login for {} from {}", username, connection.addr);
            return LoginOutcome::Rejected(INVALID_CREDENTIALS);
        }

        let admitted = {
            let mut guard = self.registry.lock().await;
            let position = self.world.spawn_position(&mut rand::thread_rng());
            guard.insert(username, position, self.max_health, connection)
        };
        let player = match admitted {
            Ok(player) => player,
            Err(RegistryError::SessionActive(_)) => return LoginOutcome::Rejected(ALREADY_LOGGED_IN),
        };

        let name = username.to_string();
        if let Err(e) = self
            .with_store(move |store| store.record_login(&name, unix_now_secs()))
            .await
        {
            warn!("Failed to record login for {}: {}", username, e);
        }

        LoginOutcome::Admitted(Admission {
            player_id: player.id,
            x: player.x,
            y: player.y,
            map_seed: self.world.seed(),
        })
    }

    async fn with_store<T, F>(&self, op: F) -> Result<T, CredentialError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, CredentialError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?
    }
}
