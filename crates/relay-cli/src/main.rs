//! # relay
//!
//! Terminal client for Relay.  Opens the local SQLite store, loads (or
//! creates) the local identity and runs a line-based REPL over a
//! [`relay_core::Session`].

mod command;
mod render;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use relay_core::{ClientConfig, EventSink, LocalIdentity, LogNotifier, Session, UiEvent};
use relay_shared::ConversationId;
use relay_store::{Database, SqliteStore, Store};

use crate::command::{Command, HELP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    relay_core::init_tracing();
    info!("Starting Relay v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 2. Store and identity
    // -----------------------------------------------------------------------
    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => Database::default_path()?,
    };
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open_at(&db_path, config.feed_capacity)?);
    info!(path = %db_path.display(), "Store opened");

    let identity_path = match &config.identity_path {
        Some(path) => path.clone(),
        None => LocalIdentity::default_path()?,
    };
    let identity = Arc::new(LocalIdentity::load_or_create(&identity_path)?);

    // -----------------------------------------------------------------------
    // 3. Session
    // -----------------------------------------------------------------------
    let (events, rx) = EventSink::channel();
    tokio::spawn(print_events(rx));

    let mut session = login(&config, &identity, &store, &events).await?;
    greet(&session);

    // -----------------------------------------------------------------------
    // 4. REPL (until /quit, EOF or Ctrl+C)
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::NewId)) => {
                        session.logout();
                        identity.regenerate_id()?;
                        session = login(&config, &identity, &store, &events).await?;
                        greet(&session);
                    }
                    Ok(Some(cmd)) => {
                        if let Err(e) = run(&session, cmd).await {
                            println!("! {e}");
                        }
                    }
                    Err(usage) => println!("! {usage}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    session.logout();
    Ok(())
}

async fn login(
    config: &ClientConfig,
    identity: &Arc<LocalIdentity>,
    store: &Arc<dyn Store>,
    events: &EventSink,
) -> relay_core::Result<Session> {
    Session::login(
        config,
        identity.clone(),
        store.clone(),
        Arc::new(LogNotifier),
        events.clone(),
    )
    .await
}

fn greet(session: &Session) {
    println!(
        "Logged in as {} ({}). Type /help for commands.",
        session.display_name(),
        session.user_id()
    );
}

async fn run(session: &Session, command: Command) -> relay_core::Result<()> {
    match command {
        Command::Add { id, name } => {
            session.add_contact(&id, &name).await?;
            println!("{}", render::roster(&session.roster()));
        }
        Command::Delete(id) => {
            if session.delete_contact(&id).await? {
                println!("  removed {id}");
            } else {
                println!("  {id} is not a contact");
            }
        }
        Command::Open(id) => {
            session.open_conversation(&id).await?;
            println!("  talking to {id}");
            println!("{}", render::history(&session.messages()));
        }
        Command::Close => session.close_conversation(),
        Command::List => println!("{}", render::roster(&session.refresh_roster().await)),
        Command::History => println!("{}", render::history(&session.messages())),
        Command::Search(prefix) => {
            println!("{}", render::profiles(&session.search(&prefix).await?));
        }
        Command::Read(id) => session.mark_read(&id),
        Command::Name(name) => {
            session.set_display_name(&name).await?;
            println!("  you are now {}", session.display_name());
        }
        Command::WhoAmI => println!("  {} ({})", session.display_name(), session.user_id()),
        Command::Help => println!("{HELP}"),
        Command::Say(text) => {
            session.send(&text).await?;
        }
        // Handled by the REPL loop, which owns the session.
        Command::Quit | Command::NewId => {}
    }
    Ok(())
}

/// Print toasts and failures, and incoming messages of the open conversation
/// as they arrive.
async fn print_events(mut rx: UnboundedReceiver<UiEvent>) {
    let mut shown = HashSet::new();
    let mut current: Option<ConversationId> = None;

    while let Some(event) = rx.recv().await {
        if let UiEvent::MessagesChanged {
            conversation_id,
            messages,
        } = &event
        {
            // The first snapshot of a conversation is its history, which
            // `/open` already printed.
            let switched = current != Some(*conversation_id);
            current = Some(*conversation_id);
            for message in messages {
                let Some(id) = message.id() else {
                    continue;
                };
                if shown.insert(id) && !switched && !message.outgoing {
                    println!("{}", render::message(message));
                }
            }
            continue;
        }

        if let Some(line) = render::event(&event) {
            println!("{line}");
        }
    }
}
