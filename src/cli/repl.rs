//! Terminal session loop
//!
//! Each line typed is one reply; the screen is printed with its `CON`/`END`
//! marker. After an `END` screen the next line starts a fresh session.

use crate::server::{build_services, load_config};
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Run the loop until stdin closes or the user types `quit`
pub async fn run(session_id: &str) -> Result<()> {
    let config = load_config()?;
    let services = build_services(&config).await?;

    println!("Session {} (type 'quit' to exit)", session_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Open with an empty reply, as a fresh dial does
    let mut input = String::new();
    loop {
        let mut screen = Vec::new();
        match services.pipeline.run(session_id, input.as_bytes(), &mut screen).await {
            Ok(_) => println!("{}\n", String::from_utf8_lossy(&screen)),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Request failed");
                println!("error: {}\n", e);
            }
        }

        print_prompt()?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line == "quit" {
            break;
        }
        input = line.to_string();
    }

    services.pipeline.close().await.context("Failed to close storage")?;
    Ok(())
}

fn print_prompt() -> Result<()> {
    use std::io::Write;
    print!("> ");
    std::io::stdout().flush().context("Failed to flush stdout")
}
