#![allow(clippy::doc_markdown)]
//! Example: Send an email with attachments through an SMTP relay
//!
//! Relay settings come from the environment:
//!
//! - `OUTBOX_USER` / `OUTBOX_PASSWORD`: relay login, also the sender
//! - `OUTBOX_HOST` (default `smtp.gmail.com`), `OUTBOX_PORT` (default 587)
//! - `OUTBOX_TO`: comma-separated recipients
//!
//! Any command line arguments are sent as file attachments.
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=outbox=debug,outbox_smtp=debug \
//!     cargo run --package outbox --example send_mail -- report.pdf
//! ```

use outbox::{Attachment, Email, Outbox};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let user = env::var("OUTBOX_USER")?;
    let password = env::var("OUTBOX_PASSWORD")?;
    let host = env::var("OUTBOX_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
    let port = match env::var("OUTBOX_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => 587,
    };
    let to = env::var("OUTBOX_TO")?;

    let email = Email::new(
        to.split(',').map(str::trim).filter(|addr| !addr.is_empty()),
        "Hello from outbox",
        "This message was sent by the outbox send_mail example.",
    )?;

    let attachments = env::args()
        .skip(1)
        .map(|path| Attachment::from_file(path.clone(), path))
        .collect::<Result<Vec<_>, _>>()?;

    let outbox = Outbox::new(&user, password, &host, port, true);
    println!("Sending to {to} via {host}:{port}...");

    let delivery = outbox.send(&email, &attachments).await?;
    println!("✓ Accepted: {}", delivery.accepted.join(", "));
    for rejection in &delivery.refused {
        println!("✗ Refused: {rejection}");
    }

    Ok(())
}
