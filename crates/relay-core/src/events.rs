use serde::Serialize;
use tokio::sync::mpsc;

use relay_shared::{ConversationId, UserId};

use crate::channel::ChannelMessage;
use crate::roster::RosterEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub body: String,
}

impl Toast {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Everything the core pushes to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    RosterChanged {
        entries: Vec<RosterEntry>,
    },
    #[serde(rename_all = "camelCase")]
    MessagesChanged {
        conversation_id: ConversationId,
        messages: Vec<ChannelMessage>,
    },
    UnreadChanged {
        counterpart: UserId,
        count: u32,
    },
    Toast(Toast),
    #[serde(rename_all = "camelCase")]
    SendFailed {
        conversation_id: Option<ConversationId>,
        reason: String,
    },
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::RosterChanged { .. } => "roster-changed",
            UiEvent::MessagesChanged { .. } => "messages-changed",
            UiEvent::UnreadChanged { .. } => "unread-changed",
            UiEvent::Toast(_) => "toast",
            UiEvent::SendFailed { .. } => "send-failed",
        }
    }
}

/// Sending half of the UI event channel.  Cheap to clone; a sink with no
/// receiver drops events after logging them.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<UiEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: UiEvent) {
        let name = event.name();
        match &self.tx {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!(event = name, "UI receiver closed, event dropped");
                }
            }
            None => tracing::trace!(event = name, "UI events disabled"),
        }
    }
}
