//! # relay-core
//!
//! Realtime conversation sync for Relay: conversation resolution, the open
//! conversation's message channel, the roster and unread tracking, on top of
//! any [`relay_store::Store`].
//!
//! A UI embeds the core by creating a [`Session`] at login and consuming
//! [`UiEvent`]s from the receiver returned by [`EventSink::channel`].

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod notify;
pub mod resolver;
pub mod roster;
pub mod session;
pub mod tracker;

use tracing_subscriber::{fmt, EnvFilter};

pub use channel::{ChannelMessage, MessageChannel, MessageKey, MessageStatus};
pub use config::ClientConfig;
pub use error::{CoreError, Result, ValidationError};
pub use events::{EventSink, Toast, ToastLevel, UiEvent};
pub use identity::{IdentityProvider, LocalIdentity};
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use resolver::ConversationResolver;
pub use roster::{RosterAggregator, RosterEntry};
pub use session::Session;
pub use tracker::{UnreadCounts, UnreadTracker};

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the default
/// filter.  Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relay=info,relay_core=debug,relay_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
