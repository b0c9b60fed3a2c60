use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use presence_chat::{
    cli::{Cli, Command, ServerArgs},
    client,
    credentials::{CredentialStore, FileStore, MemoryStore},
    password::Hasher,
    sequencer::AuthSequencer,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn open_store(args: &ServerArgs) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match &args.credentials {
        Some(path) => Arc::new(FileStore::open(path).await?),
        None => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            let store = open_store(&args).await?;
            let auth = AuthSequencer::new(store, Hasher::new(args.hashing())?);
            let listener = TcpListener::bind(args.listen).await?;
            let server = Server::new(listener, auth);
            let addr = server.local_addr()?;
            info!("server listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
