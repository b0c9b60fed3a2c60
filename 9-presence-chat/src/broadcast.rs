use crate::{
    connection::{Connection, ConnectionId},
    message::ServerToClient,
    registry::SessionRegistry,
};

/// Default filter: every bound connection.
pub fn everyone(_: &Connection) -> bool {
    true
}

/// Queues `event` on every bound connection accepted by `filter`, skipping
/// `except` (the connection whose own action produced the event).
///
/// Fire-and-forget: a closed recipient is skipped without affecting the
/// others. Returns the number of connections the event was queued for.
pub fn broadcast<F>(
    registry: &SessionRegistry,
    event: &ServerToClient,
    except: Option<ConnectionId>,
    filter: F,
) -> usize
where
    F: Fn(&Connection) -> bool,
{
    registry
        .bound()
        .filter(|connection| Some(connection.id()) != except)
        .filter(|connection| filter(connection))
        .filter(|connection| connection.send(event.clone()))
        .count()
}
