//! Presence-aware chat server for a single shared room.
//!
//! Many TCP connections are multiplexed onto per-login sessions. Chat lines
//! are relayed to every other logged-in connection, and `join`/`leave` are
//! announced once per login as it comes online or goes offline, no matter
//! how many connections that login holds.
//!
//! - [`registry`] maps logins to their live connections and reports the
//!   presence transition each change causes.
//! - [`presence`] turns those transitions into `join`/`leave` announcements
//!   under a single lock.
//! - [`broadcast`] fans an event out to a filtered set of connections.
//! - [`sequencer`] runs registrations one at a time against a
//!   [`credentials`] store, hashing passwords with [`password`].
//! - [`server`] is the TCP transport; [`client`] is a terminal front end;
//!   [`message`] is the JSON line protocol they share.

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod message;
pub mod password;
pub mod presence;
pub mod registry;
pub mod sequencer;
pub mod server;
