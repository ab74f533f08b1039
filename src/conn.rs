use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::broadcast::broadcast;
use crate::config::ServerConfig;
use crate::framing::{FrameError, LineReader, LineWriter};
use crate::protocol::{self, Command, OutboundMessage};
use crate::registry::{AuthError, Registry};
use crate::session::{Outbound, Session, SessionId};

enum Phase {
    Unauthenticated,
    Active(String),
}

/// Why a connection reached its terminal state.
#[derive(Debug)]
pub enum Close {
    Quit,
    Eof,
    ReadError(std::io::Error),
    TooLong,
    Rejected,
    Evicted,
    Idle,
}

enum Read {
    Line(String),
    Eof,
    Idle,
    Failed(FrameError),
}

struct Connection {
    id: SessionId,
    registry: Registry,
    outbound: Outbound,
    evicted: CancellationToken,
    idle_timeout: Option<Duration>,
    phase: Phase,
}

/// Register an accepted socket and start its writer and handler tasks.
///
/// Returns as soon as the tasks are spawned; the caller never waits on the
/// connection's I/O.
pub fn spawn(
    registry: Registry,
    config: Arc<ServerConfig>,
    socket: TcpStream,
    peer: SocketAddr,
) -> SessionId {
    let (reader, writer) = socket.into_split();
    let (outbound, rx) = Outbound::channel(config.outbound_capacity);

    let id = registry.register(peer, outbound.clone());
    let span = info_span!("conn", session = %id, %peer);

    let writer_task = tokio::spawn(
        write_loop(
            LineWriter::new(writer),
            rx,
            outbound.eviction_token(),
            config.write_timeout,
        )
        .instrument(span.clone()),
    );

    let conn = Connection {
        id,
        registry,
        evicted: outbound.eviction_token(),
        outbound,
        idle_timeout: config.idle_timeout,
        phase: Phase::Unauthenticated,
    };
    let lines = LineReader::new(reader, config.max_line_len);
    let write_timeout = config.write_timeout;

    tokio::spawn(
        async move {
            debug!("connected");
            conn.serve(lines, writer_task, write_timeout).await;
        }
        .instrument(span),
    );

    id
}

/// Sole writer for one socket. Ends when every sender is dropped or a write
/// fails; a failure evicts the session.
async fn write_loop(
    mut writer: LineWriter<OwnedWriteHalf>,
    mut rx: mpsc::Receiver<String>,
    evicted: CancellationToken,
    write_timeout: Duration,
) {
    while let Some(line) = rx.recv().await {
        match tokio::time::timeout(write_timeout, writer.send(&line)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(error = %err, "write failed");
                evicted.cancel();
                break;
            }
            Err(_) => {
                warn!("write timed out");
                evicted.cancel();
                break;
            }
        }
    }

    drop(rx);
    let _ = tokio::time::timeout(write_timeout, writer.shutdown()).await;
}

impl Connection {
    async fn serve<R: AsyncRead + Unpin>(
        mut self,
        mut lines: LineReader<R>,
        mut writer_task: JoinHandle<()>,
        write_timeout: Duration,
    ) {
        let reason = self.run(&mut lines).await;

        match &reason {
            Close::Quit | Close::Eof => debug!(?reason, "closing"),
            _ => warn!(?reason, "closing"),
        }

        if let Some(Session { username: Some(name), peer, .. }) = self.registry.remove(self.id) {
            info!(user = %name, %peer, "logged out");
            broadcast(&self.registry, self.id, &OutboundMessage::left(name));
        }

        // Last sender goes away with `self`; the writer drains what is queued
        // and shuts down the write half before the read half is dropped.
        drop(self);
        if tokio::time::timeout(write_timeout, &mut writer_task).await.is_err() {
            writer_task.abort();
        }
        drop(lines);
    }

    async fn run<R: AsyncRead + Unpin>(&mut self, lines: &mut LineReader<R>) -> Close {
        loop {
            let read = tokio::select! {
                _ = self.evicted.cancelled() => return Close::Evicted,
                read = next_line(lines, self.idle_timeout) => read,
            };

            let line = match read {
                Read::Line(line) => line,
                Read::Eof => return Close::Eof,
                Read::Idle => return Close::Idle,
                Read::Failed(FrameError::TooLong { .. }) => {
                    self.reply(protocol::line_too_long()).await;
                    return Close::TooLong;
                }
                Read::Failed(FrameError::Io(err)) => return Close::ReadError(err),
            };

            if line.trim().is_empty() {
                continue;
            }

            debug!(%line, "received");

            if let Some(reason) = self.on_line(&line).await {
                return reason;
            }
        }
    }

    async fn on_line(&mut self, line: &str) -> Option<Close> {
        let command = protocol::parse_command(line);

        if let Phase::Active(name) = &self.phase {
            match command {
                Ok(Command::Quit) => return Some(Close::Quit),
                Ok(Command::Say(text)) => {
                    let message = OutboundMessage::chat(name.as_str(), text);
                    broadcast(&self.registry, self.id, &message);
                }
                Ok(Command::Login(_)) => {
                    self.reply(protocol::already_logged_in(name)).await;
                }
                // Only a well-formed LOGIN is a re-login attempt; anything
                // else starting with the keyword is ordinary chat.
                Err(_) => {
                    let message = OutboundMessage::chat(name.as_str(), line.trim());
                    broadcast(&self.registry, self.id, &message);
                }
            }
            return None;
        }

        match command {
            Ok(Command::Login(name)) => return self.login(name).await,
            Ok(Command::Quit) => return Some(Close::Quit),
            Ok(Command::Say(_)) => self.reply(protocol::login_first()).await,
            Err(err) => self.reply(protocol::notice(err.to_string())).await,
        }

        None
    }

    async fn login(&mut self, name: String) -> Option<Close> {
        match self.registry.authenticate(self.id, &name) {
            Ok(()) => {
                info!(user = %name, "logged in");
                // Peers are notified before the welcome goes out, so anyone
                // who sees the welcome can rely on the join being queued.
                broadcast(&self.registry, self.id, &OutboundMessage::joined(name.as_str()));
                self.reply(protocol::welcome(&name)).await;
                self.phase = Phase::Active(name);
                None
            }
            Err(AuthError::Duplicate(name)) => {
                info!(user = %name, "rejected duplicate login");
                self.reply(protocol::name_taken(&name)).await;
                Some(Close::Rejected)
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                Some(Close::Rejected)
            }
        }
    }

    /// Queue a line for this connection's own client. A closed writer is
    /// already being handled through eviction, so failures are dropped here.
    async fn reply(&self, line: String) {
        let _ = self.outbound.send(line).await;
    }
}

async fn next_line<R: AsyncRead + Unpin>(
    lines: &mut LineReader<R>,
    idle_timeout: Option<Duration>,
) -> Read {
    let result = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
            Ok(result) => result,
            Err(_) => return Read::Idle,
        },
        None => lines.next_line().await,
    };

    match result {
        Ok(Some(line)) => Read::Line(line),
        Ok(None) => Read::Eof,
        Err(err) => Read::Failed(err),
    }
}
