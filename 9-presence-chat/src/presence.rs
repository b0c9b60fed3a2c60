//! Join/leave decisions for the shared room.
//!
//! All registry mutations and the presence announcements derived from them
//! happen under one lock, so two interleaved transitions can never observe
//! the same empty/non-empty state.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    broadcast::{broadcast, everyone},
    connection::{Connection, ConnectionId, Outbound},
    error::ChatError,
    message::{Outcome, ServerToClient},
    registry::SessionRegistry,
};

pub struct PresenceCoordinator {
    registry: Mutex<SessionRegistry>,
    next_id: AtomicU64,
}

impl Default for PresenceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceCoordinator {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(SessionRegistry::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Tracks a new, unbound connection and returns its id.
    pub async fn connect(&self, outbound: Outbound) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.lock().await.insert(Connection::new(id, outbound));
        id
    }

    /// Binds `id` to `login` after a successful authentication.
    ///
    /// The success reply is queued first, then `leave` for a vacated previous
    /// identity, then `join` if `login` just came online. Returns `false` if
    /// the connection is already gone.
    pub async fn authenticated(&self, id: ConnectionId, login: &str) -> bool {
        let mut registry = self.registry.lock().await;
        let Some(registration) = registry.register(id, login) else {
            return false;
        };

        if let Some(connection) = registry.get(id) {
            connection.send(ServerToClient::Auth(Outcome::accepted(login)));
        }
        info!(connection = id, login, "logged in");

        if let Some(previous) = registration.vacated {
            info!(login = %previous, "left");
            broadcast(
                &registry,
                &ServerToClient::Leave { login: previous },
                Some(id),
                everyone,
            );
        }

        if registration.first_for_login {
            info!(login, "joined");
            broadcast(
                &registry,
                &ServerToClient::Join {
                    login: login.to_string(),
                },
                None,
                |connection| !connection.is_bound_to(login),
            );
        }

        true
    }

    /// Tears a connection down. Safe to call more than once; only the first
    /// call has an effect.
    pub async fn disconnected(&self, id: ConnectionId) {
        let mut registry = self.registry.lock().await;
        let Some((_, departure)) = registry.remove(id) else {
            return;
        };

        let Some(departure) = departure else {
            return;
        };
        info!(connection = id, login = %departure.login, "logged out");

        if departure.vacated {
            info!(login = %departure.login, "left");
            broadcast(
                &registry,
                &ServerToClient::Leave {
                    login: departure.login,
                },
                None,
                everyone,
            );
        }
    }

    /// Relays a chat line from `id` to every other bound connection.
    pub async fn chat(&self, id: ConnectionId, body: String) -> Result<usize, ChatError> {
        let registry = self.registry.lock().await;
        let connection = registry.get(id).ok_or(ChatError::UnknownConnection(id))?;
        let Some(from) = connection.bound_login() else {
            warn!(connection = id, "ignoring chat from connection that is not logged in");
            return Err(ChatError::Unauthenticated(id));
        };

        let event = ServerToClient::Chat {
            from: from.to_string(),
            body,
        };
        Ok(broadcast(&registry, &event, Some(id), everyone))
    }

    /// Sends a direct reply to one connection.
    pub async fn reply(&self, id: ConnectionId, event: ServerToClient) -> bool {
        let registry = self.registry.lock().await;
        registry
            .get(id)
            .is_some_and(|connection| connection.send(event))
    }

    pub async fn is_present(&self, login: &str) -> bool {
        self.registry.lock().await.is_present(login)
    }

    pub async fn online(&self) -> Vec<String> {
        self.registry.lock().await.online()
    }
}
