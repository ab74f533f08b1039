use std::process::ExitCode;

use anyhow::{Context, Result};
use relay_chat::client::{self, Console, Exit};
use relay_chat::{ClientConfig, logging};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("warn");

    match run().await {
        Ok(Exit::Quit) => ExitCode::SUCCESS,
        Ok(Exit::Disconnected) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<Exit> {
    let config = ClientConfig::from_env()?;
    let console = Console::stdout();
    let mut input = client::stdin_lines();

    let Some(username) = client::read_username(&console, &mut input).await else {
        return Ok(Exit::Quit);
    };

    let stream = TcpStream::connect(&config.server)
        .await
        .with_context(|| format!("failed to connect to {}", config.server))?;

    console.notice("Connected to the server.");

    client::run(stream, &username, input, console, config.max_line_len).await
}
