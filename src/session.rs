use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    Full,
    #[error("connection writer gone")]
    Closed,
}

/// Sending side of a connection.
///
/// Lines pushed here are written to the socket by the one writer task that
/// owns the write half, so writes to a socket never interleave. Cloning is
/// cheap; the registry keeps one clone and the handler another.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
    evicted: CancellationToken,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let outbound = Self {
            tx,
            evicted: CancellationToken::new(),
        };

        (outbound, rx)
    }

    /// Enqueue without waiting.
    pub fn try_deliver(&self, line: String) -> Result<(), DeliveryError> {
        self.tx.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Enqueue a reply to this connection's own client, waiting for room.
    pub async fn send(&self, line: String) -> Result<(), DeliveryError> {
        self.tx.send(line).await.map_err(|_| DeliveryError::Closed)
    }

    /// Ask the owning handler to tear the session down.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Token the writer task cancels when a socket write fails.
    pub fn eviction_token(&self) -> CancellationToken {
        self.evicted.clone()
    }
}

/// Server-side record of one connected client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub outbound: Outbound,
    pub username: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }
}
