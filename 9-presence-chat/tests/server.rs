use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, bail};
use presence_chat::{
    credentials::MemoryStore,
    message::{ClientToServer, Outcome, ServerToClient, read_message, write_message},
    password::{Hasher, HashingConfig},
    sequencer::AuthSequencer,
    server::Server,
};
use tokio::{
    io::BufReader,
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let hasher = Hasher::new(HashingConfig {
            memory_kib: 1024,
            iterations: 1,
        })?;
        let server = Server::new(
            listener,
            AuthSequencer::new(Arc::new(MemoryStore::new()), hasher),
        );

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = server.run_until(shutdown).await;
        });

        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

struct Peer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Connects, registers `login` and logs in with it.
    async fn signed_up(addr: SocketAddr, login: &str) -> Result<Self> {
        let mut peer = Self::connect(addr).await?;
        peer.register(login).await?;
        assert_eq!(
            peer.recv().await?,
            ServerToClient::Register(Outcome::accepted(login))
        );
        peer.login(login).await?;
        assert_eq!(
            peer.recv().await?,
            ServerToClient::Auth(Outcome::accepted(login))
        );
        Ok(peer)
    }

    async fn send(&mut self, message: ClientToServer) -> Result<()> {
        write_message(&mut self.writer, &message).await?;
        Ok(())
    }

    async fn register(&mut self, login: &str) -> Result<()> {
        self.send(ClientToServer::Register {
            login: login.into(),
            password: password_for(login),
        })
        .await
    }

    async fn login(&mut self, login: &str) -> Result<()> {
        self.send(ClientToServer::Auth {
            login: login.into(),
            password: password_for(login),
        })
        .await
    }

    async fn chat(&mut self, body: &str) -> Result<()> {
        self.send(ClientToServer::Chat { body: body.into() }).await
    }

    async fn recv(&mut self) -> Result<ServerToClient> {
        match timeout(READ_TIMEOUT, read_message(&mut self.reader)).await?? {
            Some(message) => Ok(message),
            None => bail!("server closed the connection"),
        }
    }
}

fn password_for(login: &str) -> String {
    format!("{login}-password")
}

fn chat(from: &str, body: &str) -> ServerToClient {
    ServerToClient::Chat {
        from: from.into(),
        body: body.into(),
    }
}

#[tokio::test]
async fn chat_presence_and_shared_login_scenario() -> Result<()> {
    let server = TestServer::start().await?;

    let mut c1 = Peer::signed_up(server.addr, "amy").await?;
    let mut c2 = Peer::signed_up(server.addr, "bob").await?;
    assert_eq!(
        c1.recv().await?,
        ServerToClient::Join {
            login: "bob".into()
        }
    );

    c1.chat("hi").await?;
    assert_eq!(c2.recv().await?, chat("amy", "hi"));

    drop(c2);
    // Nothing was echoed to c1, so the leave is the next thing it sees.
    assert_eq!(
        c1.recv().await?,
        ServerToClient::Leave {
            login: "bob".into()
        }
    );

    let mut c3 = Peer::connect(server.addr).await?;
    c3.login("amy").await?;
    assert_eq!(
        c3.recv().await?,
        ServerToClient::Auth(Outcome::accepted("amy"))
    );

    // amy was already online: c1 sees c3's chat without any join/leave first.
    c3.chat("second tab").await?;
    assert_eq!(c1.recv().await?, chat("amy", "second tab"));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn simultaneous_registrations_admit_exactly_one() -> Result<()> {
    let server = TestServer::start().await?;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut peer = Peer::connect(addr).await?;
            peer.register("zed").await?;
            peer.recv().await
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        match task.await?? {
            ServerToClient::Register(outcome) if outcome.success => admitted += 1,
            ServerToClient::Register(outcome) => {
                let error = outcome.error.expect("failure carries an error");
                assert_eq!(error.name, "AlreadyExists");
            }
            other => bail!("unexpected reply: {other:?}"),
        }
    }
    assert_eq!(admitted, 1);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn switching_identity_announces_leave_then_join() -> Result<()> {
    let server = TestServer::start().await?;

    let mut watcher = Peer::signed_up(server.addr, "carol").await?;
    let mut switcher = Peer::signed_up(server.addr, "amy").await?;
    assert_eq!(
        watcher.recv().await?,
        ServerToClient::Join {
            login: "amy".into()
        }
    );
    switcher.register("bob").await?;
    assert_eq!(
        switcher.recv().await?,
        ServerToClient::Register(Outcome::accepted("bob"))
    );

    switcher.login("bob").await?;
    assert_eq!(
        switcher.recv().await?,
        ServerToClient::Auth(Outcome::accepted("bob"))
    );

    assert_eq!(
        watcher.recv().await?,
        ServerToClient::Leave {
            login: "amy".into()
        }
    );
    assert_eq!(
        watcher.recv().await?,
        ServerToClient::Join {
            login: "bob".into()
        }
    );

    switcher.chat("it's bob now").await?;
    assert_eq!(watcher.recv().await?, chat("bob", "it's bob now"));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn switching_to_an_online_login_announces_only_the_leave() -> Result<()> {
    let server = TestServer::start().await?;

    let mut watcher = Peer::signed_up(server.addr, "carol").await?;
    let mut bob = Peer::signed_up(server.addr, "bob").await?;
    assert_eq!(
        watcher.recv().await?,
        ServerToClient::Join {
            login: "bob".into()
        }
    );
    let mut switcher = Peer::signed_up(server.addr, "amy").await?;
    for peer in [&mut watcher, &mut bob] {
        assert_eq!(
            peer.recv().await?,
            ServerToClient::Join {
                login: "amy".into()
            }
        );
    }

    switcher.login("bob").await?;
    assert_eq!(
        switcher.recv().await?,
        ServerToClient::Auth(Outcome::accepted("bob"))
    );

    // The leave is followed directly by the chat: no join for bob in between.
    switcher.chat("bob again").await?;
    for peer in [&mut watcher, &mut bob] {
        assert_eq!(
            peer.recv().await?,
            ServerToClient::Leave {
                login: "amy".into()
            }
        );
        assert_eq!(peer.recv().await?, chat("bob", "bob again"));
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn unauthenticated_chat_is_neither_relayed_nor_answered() -> Result<()> {
    let server = TestServer::start().await?;

    let mut member = Peer::signed_up(server.addr, "amy").await?;
    let mut lurker = Peer::connect(server.addr).await?;

    lurker.chat("anyone there?").await?;
    lurker.login("ghost").await?;
    match lurker.recv().await? {
        ServerToClient::Auth(outcome) => {
            assert!(!outcome.success);
            let error = outcome.error.expect("failure carries an error");
            assert_eq!(error.name, "AuthenticationFailed");
            assert_eq!(error.code, "NOT_FOUND");
        }
        other => bail!("unexpected reply: {other:?}"),
    }

    let mut other = Peer::signed_up(server.addr, "bob").await?;
    other.chat("hello amy").await?;
    // The join for bob comes before the relayed chat, and nothing from the lurker.
    assert_eq!(
        member.recv().await?,
        ServerToClient::Join {
            login: "bob".into()
        }
    );
    assert_eq!(member.recv().await?, chat("bob", "hello amy"));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn wrong_password_keeps_existing_login() -> Result<()> {
    let server = TestServer::start().await?;

    let mut amy = Peer::signed_up(server.addr, "amy").await?;
    let mut bob = Peer::signed_up(server.addr, "bob").await?;
    assert_eq!(
        amy.recv().await?,
        ServerToClient::Join {
            login: "bob".into()
        }
    );

    amy.send(ClientToServer::Auth {
        login: "bob".into(),
        password: "guess".into(),
    })
    .await?;
    match amy.recv().await? {
        ServerToClient::Auth(outcome) => {
            assert!(!outcome.success);
            assert_eq!(outcome.error.map(|error| error.code).as_deref(), Some("PASSWORD_INVALID"));
        }
        other => bail!("unexpected reply: {other:?}"),
    }

    amy.chat("still amy").await?;
    assert_eq!(bob.recv().await?, chat("amy", "still amy"));

    server.stop().await;
    Ok(())
}
