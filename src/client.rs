//! Interactive chat client.
//!
//! One socket, two loops: a spawned receiver task owns the read half and
//! renders whatever the server sends; the calling task owns the write half,
//! forwards operator input, and decides when to stop. Both print through one
//! [`Console`].

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::framing::{LineReader, LineWriter};
use crate::protocol::{self, Incoming, MAX_USERNAME_LEN, QUIT};

const PROMPT: &str = "> ";
const QUIT_GRACE: Duration = Duration::from_secs(3);

pub const DISCONNECTED: &str = "Disconnected from server.";

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The operator typed `/quit` or closed input.
    Quit,
    /// The server went away first.
    Disconnected,
}

/// Terminal shared by the sender and the receiver.
///
/// The lock is held for exactly one render-plus-prompt write.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    /// Print one line from the server, then restore the prompt.
    pub fn render(&self, line: &str) {
        let text = match Incoming::parse(line) {
            Incoming::System(text) => format!("[server] {text}"),
            Incoming::Chat { from, text } => format!("{from}: {text}"),
            Incoming::Raw(text) => text.to_string(),
        };
        self.write(&format!("\r{text}\n{PROMPT}"));
    }

    pub fn notice(&self, text: &str) {
        self.write(&format!("\r{text}\n"));
    }

    pub fn prompt(&self) {
        self.write(PROMPT);
    }

    pub fn ask(&self, question: &str) {
        self.write(question);
    }
}

/// Operator input as a stream of lines.
///
/// Reading happens on a plain OS thread: a blocking stdin read cannot be
/// cancelled, and parking it on the runtime's blocking pool would stall
/// runtime shutdown until the next keypress.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let failed = line.is_err();
            if tx.unbounded_send(line).is_err() || failed {
                break;
            }
        }
    });

    rx
}

/// Same rules the server applies to `LOGIN`, checked before connecting.
pub fn valid_username(name: &str) -> bool {
    protocol::check_username(name).is_ok()
}

/// Prompt until the operator enters a usable name. `None` if input ends.
pub async fn read_username<I, E>(console: &Console, input: &mut I) -> Option<String>
where
    I: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    loop {
        console.ask("Enter username: ");

        let name = match input.next().await? {
            Ok(line) => line.trim().to_string(),
            Err(err) => {
                debug!(error = %err, "input failed");
                return None;
            }
        };

        if valid_username(&name) {
            return Some(name);
        }

        console.notice(&format!(
            "Username must be 1-{MAX_USERNAME_LEN} characters, no spaces or ':', and not {}.",
            protocol::SERVER_NAME
        ));
    }
}

/// Log in as `username` and run both loops until quit or disconnect.
pub async fn run<S, I, E>(
    stream: S,
    username: &str,
    mut input: I,
    console: Console,
    max_line_len: usize,
) -> Result<Exit>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    I: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut writer = LineWriter::new(writer);

    writer
        .send(&format!("{} {username}", protocol::LOGIN))
        .await
        .context("failed to send login")?;

    // Relayed lines carry the sender's name on top of what the server accepts.
    let lines = LineReader::new(reader, protocol::relayed_line_limit(max_line_len));
    let mut receiver = tokio::spawn(receive(lines, console.clone()));

    console.prompt();

    loop {
        let next = tokio::select! {
            _ = &mut receiver => return Ok(Exit::Disconnected),
            next = input.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                debug!(error = %err, "input failed");
                break;
            }
            None => break,
        };

        if line.trim() == QUIT {
            break;
        }

        if line.trim().is_empty() {
            console.prompt();
            continue;
        }

        if let Err(err) = writer.send(&line).await {
            debug!(error = %err, "send failed");
            let _ = (&mut receiver).await;
            return Ok(Exit::Disconnected);
        }

        console.prompt();
    }

    // Best effort: the server may already be gone.
    let _ = writer.send(QUIT).await;
    let _ = writer.shutdown().await;

    finish(receiver).await;

    Ok(Exit::Quit)
}

/// Wait for the receiver to see the server close, then give up on it.
async fn finish(mut receiver: JoinHandle<()>) {
    if tokio::time::timeout(QUIT_GRACE, &mut receiver).await.is_err() {
        receiver.abort();
    }
}

async fn receive<R: AsyncRead + Unpin>(mut lines: LineReader<R>, console: Console) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => console.render(&line),
            Ok(None) => break,
            Err(err) => {
                console.notice(&format!("Connection error: {err}"));
                break;
            }
        }
    }

    console.notice(DISCONNECTED);
}
