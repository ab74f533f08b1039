//! Line-based TCP chat.
//!
//! Clients log in with `LOGIN <username>` and every line they send after
//! that is relayed to everyone else who is logged in. See [`server::Server`]
//! for the listening side and [`client::run`] for the interactive client.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod conn;
pub mod framing;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod status;

pub use config::{ClientConfig, ServerConfig};
pub use registry::Registry;
pub use server::Server;
