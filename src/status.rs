//! Read-only HTTP view of who is online: `GET /users` answers with the
//! registry snapshot as JSON.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::registry::Registry;

#[derive(Debug, Serialize)]
pub struct UserList {
    pub count: usize,
    pub users: Vec<String>,
}

/// Routes of the status listener. Other methods on `/users` get 405 and
/// other paths 404.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .with_state(registry)
}

/// GET /users
async fn list_users(State(registry): State<Registry>) -> Json<UserList> {
    let users = registry.snapshot();
    Json(UserList {
        count: users.len(),
        users,
    })
}

pub struct StatusServer {
    listener: TcpListener,
    registry: Registry,
}

impl StatusServer {
    pub async fn bind(addr: &str, registry: Registry) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind status listener {addr}"))?;

        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "status listening");

        axum::serve(self.listener, router(self.registry))
            .await
            .context("status listener failed")
    }
}
