use tokio::sync::mpsc;
use tracing::debug;

use crate::message::ServerToClient;

pub type ConnectionId = u64;

pub type Outbound = mpsc::UnboundedSender<ServerToClient>;

/// One live transport link as seen by the session registry.
///
/// The socket itself stays with the transport; the registry only keeps the
/// sending half of the connection's outbound queue. Everything pushed through
/// [`Connection::send`] reaches the peer in submission order.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    bound_login: Option<String>,
    outbound: Outbound,
}

impl Connection {
    pub fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self {
            id,
            bound_login: None,
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn bound_login(&self) -> Option<&str> {
        self.bound_login.as_deref()
    }

    pub fn is_bound_to(&self, login: &str) -> bool {
        self.bound_login() == Some(login)
    }

    pub(crate) fn bind(&mut self, login: String) -> Option<String> {
        self.bound_login.replace(login)
    }

    pub(crate) fn unbind(&mut self) -> Option<String> {
        self.bound_login.take()
    }

    /// Queues an event for this connection. Returns `false` once the
    /// transport side has gone away.
    pub fn send(&self, event: ServerToClient) -> bool {
        match self.outbound.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(connection = self.id, "dropping event for closed connection");
                false
            }
        }
    }
}
