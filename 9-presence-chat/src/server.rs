use std::{future::Future, io, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader},
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    connection::ConnectionId,
    error::ChatError,
    message::{ClientToServer, Outcome, ServerToClient, read_message, write_message},
    presence::PresenceCoordinator,
    sequencer::AuthSequencer,
};

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

struct ServerState {
    presence: PresenceCoordinator,
    auth: AuthSequencer,
}

impl Server {
    pub fn new(listener: TcpListener, auth: AuthSequencer) -> Self {
        Self {
            listener,
            state: Arc::new(ServerState {
                presence: PresenceCoordinator::new(),
                auth,
            }),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    let online = state.presence.online().await;
                    info!(?online, "server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<ServerState>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, state),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, state: &Arc<ServerState>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, peer, state).await {
            warn!(peer = %peer, error = ?err, "connection closed with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (outbound, inbox) = mpsc::unbounded_channel();
    let id = state.presence.connect(outbound).await;
    info!(connection = id, %peer, "connection accepted");

    let writer_task = tokio::spawn(forward_outbound(inbox, writer, id));

    let session = run_session(&state, &mut reader, id).await;

    // Dropping the registry's sender ends the writer once it has drained.
    state.presence.disconnected(id).await;
    if let Err(err) = writer_task.await {
        warn!(connection = id, error = ?err, "writer task failed");
    }
    info!(connection = id, %peer, "connection closed");

    session
}

async fn run_session<R>(state: &ServerState, reader: &mut R, id: ConnectionId) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_message::<_, ClientToServer>(reader).await {
            Ok(Some(message)) => handle_client_message(state, id, message).await,
            Ok(None) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(connection = id, error = %err, "ignoring undecodable message");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn handle_client_message(state: &ServerState, id: ConnectionId, message: ClientToServer) {
    match message {
        ClientToServer::Auth { login, password } => {
            handle_auth(state, id, login, password).await;
        }
        ClientToServer::Register { login, password } => {
            handle_register(state, id, login, password).await;
        }
        ClientToServer::Chat { body } => handle_chat(state, id, body).await,
    }
}

async fn handle_chat(state: &ServerState, id: ConnectionId, body: String) {
    match state.presence.chat(id, body).await {
        Ok(delivered) => debug!(connection = id, delivered, "chat relayed"),
        // Logged by the coordinator; no reply.
        Err(ChatError::Unauthenticated(_)) => {}
        Err(err @ ChatError::UnknownConnection(_)) => {
            debug!(connection = id, %err, "dropping chat from closed connection");
        }
    }
}

async fn handle_auth(state: &ServerState, id: ConnectionId, login: String, password: String) {
    match state.auth.authenticate(&login, &password).await {
        Ok(()) => {
            if !state.presence.authenticated(id, &login).await {
                debug!(connection = id, %login, "connection closed before login completed");
            }
        }
        Err(err) => {
            if err.is_rejection() {
                debug!(connection = id, %login, %err, "authentication failed");
            } else {
                warn!(connection = id, %login, error = ?err, "authentication error");
            }
            let reply = ServerToClient::Auth(Outcome::rejected(login, err.wire()));
            state.presence.reply(id, reply).await;
        }
    }
}

async fn handle_register(state: &ServerState, id: ConnectionId, login: String, password: String) {
    let outcome = match state.auth.register(&login, &password).await {
        Ok(()) => Outcome::accepted(login),
        Err(err) => {
            debug!(connection = id, %login, %err, "registration not completed");
            Outcome::rejected(login, err.wire())
        }
    };
    state
        .presence
        .reply(id, ServerToClient::Register(outcome))
        .await;
}

async fn forward_outbound<W>(
    mut inbox: mpsc::UnboundedReceiver<ServerToClient>,
    mut writer: W,
    id: ConnectionId,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = inbox.recv().await {
        if let Err(err) = write_message(&mut writer, &event).await {
            debug!(connection = id, ?err, "failed to deliver message to client");
            break;
        }
    }
}
