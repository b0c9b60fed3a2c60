//! Login to live-connection mapping.
//!
//! The registry is the only record of who is online. It performs no I/O:
//! every mutation reports the presence transition it caused and the caller
//! decides what to announce.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::connection::{Connection, ConnectionId};

/// Transition caused by binding a connection to a login.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registration {
    /// The login had no live connection before this one.
    pub first_for_login: bool,
    /// Previous login of the connection, if its last connection just left.
    pub vacated: Option<String>,
}

/// Transition caused by unbinding a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub login: String,
    /// `login` has no live connection left.
    pub vacated: bool,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    // A key is present iff its set is non-empty.
    sessions: HashMap<String, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly accepted, unbound connection.
    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id(), connection);
    }

    /// Forgets a connection, unbinding it first. Returns `None` if the
    /// connection was already removed, so teardown happens at most once.
    pub fn remove(&mut self, id: ConnectionId) -> Option<(Connection, Option<Departure>)> {
        let departure = self.unregister(id);
        let connection = self.connections.remove(&id)?;
        Some((connection, departure))
    }

    /// Binds `id` to `login`, moving it out of its previous login's set.
    ///
    /// Returns `None` for a connection that is not (or no longer) tracked;
    /// a removed connection is never re-added.
    pub fn register(&mut self, id: ConnectionId, login: &str) -> Option<Registration> {
        let connection = self.connections.get_mut(&id)?;
        if connection.is_bound_to(login) {
            return Some(Registration::default());
        }

        let previous = connection.bind(login.to_string());
        let vacated = previous.filter(|previous| detach(&mut self.sessions, previous, id));

        let members = self.sessions.entry(login.to_string()).or_default();
        let first_for_login = members.is_empty();
        members.insert(id);

        Some(Registration {
            first_for_login,
            vacated,
        })
    }

    /// Unbinds `id` from its login. No-op for unbound or unknown connections.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Departure> {
        let login = self.connections.get_mut(&id)?.unbind()?;
        let vacated = detach(&mut self.sessions, &login, id);
        Some(Departure { login, vacated })
    }

    pub fn is_present(&self, login: &str) -> bool {
        self.sessions.contains_key(login)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Logins with at least one live connection, sorted.
    pub fn online(&self) -> Vec<String> {
        self.sessions
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[cfg(test)]
    fn connection_count(&self, login: &str) -> usize {
        self.sessions.get(login).map_or(0, HashSet::len)
    }

    /// Every connection currently bound to some login.
    pub fn bound(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.sessions
            .values()
            .flatten()
            .filter_map(|id| self.connections.get(id))
    }
}

/// Removes `id` from `login`'s set, dropping the set once empty. Returns
/// whether the login lost its last connection.
fn detach(
    sessions: &mut HashMap<String, HashSet<ConnectionId>>,
    login: &str,
    id: ConnectionId,
) -> bool {
    let Some(members) = sessions.get_mut(login) else {
        return false;
    };
    members.remove(&id);
    if members.is_empty() {
        sessions.remove(login);
        true
    } else {
        false
    }
}
