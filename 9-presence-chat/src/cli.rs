use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::password::HashingConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a server and participate in the chat.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// JSON file holding login/password-hash pairs. Credentials are kept in
    /// memory when omitted.
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Argon2 memory cost in KiB.
    #[arg(long, default_value_t = HashingConfig::default().memory_kib)]
    pub hash_memory_kib: u32,

    /// Argon2 iteration count.
    #[arg(long, default_value_t = HashingConfig::default().iterations)]
    pub hash_iterations: u32,
}

impl ServerArgs {
    pub fn hashing(&self) -> HashingConfig {
        HashingConfig {
            memory_kib: self.hash_memory_kib,
            iterations: self.hash_iterations,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,

    /// Log in as this user right after connecting.
    #[arg(long, requires = "password")]
    pub login: Option<String>,

    /// Password for `--login`.
    #[arg(long, requires = "login")]
    pub password: Option<String>,

    /// Register `--login` before logging in.
    #[arg(long, requires = "login")]
    pub register: bool,
}
