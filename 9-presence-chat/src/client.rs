use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    message::{ClientToServer, Outcome, ServerToClient, read_message, write_message},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    send_initial_login(&mut writer, &args).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    run_client_loop(&mut reader, &mut writer, &mut stdin, &mut input).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(args: &ClientArgs) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn send_initial_login(writer: &mut OwnedWriteHalf, args: &ClientArgs) -> Result<()> {
    let (Some(login), Some(password)) = (&args.login, &args.password) else {
        return Ok(());
    };

    if args.register {
        write_message(
            writer,
            &ClientToServer::Register {
                login: login.clone(),
                password: password.clone(),
            },
        )
        .await?;
    }
    write_message(
        writer,
        &ClientToServer::Auth {
            login: login.clone(),
            password: password.clone(),
        },
    )
    .await?;
    Ok(())
}

async fn run_client_loop(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            server_message = read_message::<_, ServerToClient>(reader) => {
                if !handle_server_message(server_message).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_message(message: io::Result<Option<ServerToClient>>) -> Result<bool> {
    match message? {
        Some(message) => {
            write_line(&render_server_message(message)).await?;
            Ok(true)
        }
        None => {
            write_stdout("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

/// What a line typed by the user asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(ClientToServer),
    Quit,
    Usage(&'static str),
    Nothing,
}

fn parse_input(text: &str) -> Input {
    let text = text.trim_end();
    if text.is_empty() {
        return Input::Nothing;
    }
    if text.eq_ignore_ascii_case("/quit") {
        return Input::Quit;
    }

    let mut words = text.split_whitespace();
    let command = words.next().unwrap_or_default();
    let credentials = match (words.next(), words.next(), words.next()) {
        (Some(login), Some(password), None) => Some((login.to_string(), password.to_string())),
        _ => None,
    };

    match (command, credentials) {
        ("/login", Some((login, password))) => Input::Send(ClientToServer::Auth { login, password }),
        ("/login", None) => Input::Usage("usage: /login <login> <password>"),
        ("/register", Some((login, password))) => {
            Input::Send(ClientToServer::Register { login, password })
        }
        ("/register", None) => Input::Usage("usage: /register <login> <password>"),
        _ => Input::Send(ClientToServer::Chat {
            body: text.to_string(),
        }),
    }
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let bytes_read = bytes_read?;
    if bytes_read == 0 {
        return Ok(false);
    }

    match parse_input(input) {
        Input::Nothing => Ok(true),
        Input::Quit => {
            write_stdout("*** leaving chat").await?;
            Ok(false)
        }
        Input::Usage(usage) => {
            write_stderr(&format!("!!! {usage}")).await?;
            Ok(true)
        }
        Input::Send(message) => {
            write_message(writer, &message).await?;
            Ok(true)
        }
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

/// A rendered line and the stream it belongs on.
enum Line {
    Out(String),
    Err(String),
}

fn render_server_message(message: ServerToClient) -> Line {
    match message {
        ServerToClient::Auth(outcome) => render_outcome(outcome, "logged in as", "login failed"),
        ServerToClient::Register(outcome) => {
            render_outcome(outcome, "registered", "registration failed")
        }
        ServerToClient::Join { login } => Line::Out(format!("*** {login} joined the chat")),
        ServerToClient::Leave { login } => Line::Out(format!("*** {login} left the chat")),
        ServerToClient::Chat { from, body } => Line::Out(format!("<{from}> {body}")),
    }
}

fn render_outcome(outcome: Outcome, success: &str, failure: &str) -> Line {
    match outcome.error {
        None if outcome.success => Line::Out(format!("*** {success} {}", outcome.login)),
        Some(error) => Line::Err(format!("!!! {failure}: {}", error.message)),
        None => Line::Err(format!("!!! {failure}")),
    }
}

async fn write_line(line: &Line) -> io::Result<()> {
    match line {
        Line::Out(text) => write_stdout(text).await,
        Line::Err(text) => write_stderr(text).await,
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
