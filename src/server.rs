use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::status;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound chat server, ready to accept.
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    config: Arc<ServerConfig>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;

        Ok(Self {
            listener,
            registry: Registry::new(),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accept until `shutdown` resolves or the listener itself fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Some(addr) = &self.config.status_listen {
            let status = status::StatusServer::bind(addr, self.registry.clone()).await?;
            tokio::spawn(async move {
                if let Err(err) = status.run().await {
                    error!("status listener failed: {err:?}");
                }
            });
        }

        info!(addr = %self.local_addr()?, "listening");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer)) => {
                    crate::conn::spawn(self.registry.clone(), self.config.clone(), socket, peer);
                }
                Err(err) if is_transient(&err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(err) => return Err(err).context("listener failed"),
            }
        }
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }
}

/// Errors that concern one pending connection or a temporary shortage of
/// descriptors/buffers rather than the listening socket.
fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) || matches!(
        err.raw_os_error(),
        Some(libc::ENFILE | libc::EMFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}
