//! Terminal rendering of roster, history and UI events.

use chrono::Local;

use relay_core::{ChannelMessage, MessageStatus, RosterEntry, ToastLevel, UiEvent};
use relay_store::Profile;

pub fn roster(entries: &[RosterEntry]) -> String {
    if entries.is_empty() {
        return "  (no contacts or conversations yet)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let badge = if e.unread_count > 0 {
                format!(" [{}]", e.unread_count)
            } else {
                String::new()
            };
            let when = e
                .last_activity_at
                .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string());
            let preview = e.last_message_preview.as_deref().unwrap_or("");
            let marker = if e.is_contact { ' ' } else { '*' };
            format!(
                " {marker}{when}  {}  {}{badge}  {preview}",
                e.counterpart_id, e.display_name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn message(m: &ChannelMessage) -> String {
    let when = m.created_at.with_timezone(&Local).format("%H:%M:%S");
    let status = match m.status {
        MessageStatus::Sending => " (sending)",
        MessageStatus::Sent | MessageStatus::Delivered | MessageStatus::Read => "",
    };
    let who = if m.outgoing {
        "you".to_string()
    } else {
        m.sender_id.to_string()
    };
    format!("  {when} {who}: {}{status}", m.content)
}

pub fn history(messages: &[ChannelMessage]) -> String {
    if messages.is_empty() {
        return "  (no messages)".to_string();
    }
    messages.iter().map(message).collect::<Vec<_>>().join("\n")
}

pub fn profiles(found: &[Profile]) -> String {
    if found.is_empty() {
        return "  (no matches)".to_string();
    }
    found
        .iter()
        .map(|p| match p.preferred_name() {
            Some(name) => format!("  {}  {name}", p.id),
            None => format!("  {}", p.id),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Line to print for an event, if it is worth showing outside a command.
pub fn event(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::Toast(toast) => Some(match toast.level {
            ToastLevel::Info => format!("* {}: {}", toast.title, toast.body),
            ToastLevel::Error => format!("! {}: {}", toast.title, toast.body),
        }),
        UiEvent::SendFailed { reason, .. } => Some(format!("! send failed: {reason}")),
        UiEvent::MessagesChanged { .. }
        | UiEvent::RosterChanged { .. }
        | UiEvent::UnreadChanged { .. } => None,
    }
}
