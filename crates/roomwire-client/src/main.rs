//! roomwire client CLI
//!
//! - Loads `roomwire.yaml` (or the path given as the first argument)
//! - Connects the configured backend with the durable device identity
//! - Joins a room (second argument, default `general-support`)
//! - Prints inbound envelopes, sends each stdin line, leaves on EOF

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use roomwire_core::error::Result;
use roomwire_core::protocol::{validate_message_text, ChatEvent};

use roomwire_client::{app_state::AppState, config, ChatTransportExt, EventFilter};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, code = e.code().as_str(), "roomwire-client failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "roomwire.yaml".into());
    let room = args.next().unwrap_or_else(|| "general-support".into());

    let cfg = config::load_from_file(&path)?;
    let state = AppState::new(&cfg)?;
    let transport = state.transport();
    let me = state.identity()?;

    let printer = transport.on(EventFilter::All, |env| match &env.event {
        ChatEvent::Message(m) => {
            let who = env.user.as_ref().map(|u| u.username.as_str()).unwrap_or("?");
            println!("[{}] {who}: {}", m.room_id, m.message);
        }
        ChatEvent::Error(e) => eprintln!("! {}", e.message),
        other => tracing::debug!(kind = other.kind().as_str(), "event"),
    });

    transport.connect(&me).await?;
    transport.join_room(&room).await?;
    tracing::info!(user = %me.username, %room, backend = transport.backend(), "joined");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match validate_message_text(&line) {
            Ok(text) => transport.send_message(&room, text).await?,
            Err(e) => eprintln!("! {e}"),
        }
    }

    transport.leave_room(&room).await?;
    printer.unsubscribe();
    transport.disconnect().await;
    Ok(())
}
