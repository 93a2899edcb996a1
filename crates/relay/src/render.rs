//! One-line text rendering of relay traffic for the terminal.

use relay_protocol::{Envelope, Meta, ServerEvent};

use crate::state::{ClientState, Origin};

/// Renders an event as seen by the peer described by `state`.
///
/// `server:history` renders as a header only; callers print its entries
/// with [`render_envelope`].
pub fn render_event(event: &ServerEvent, state: &ClientState) -> String {
    match event {
        ServerEvent::Welcome(welcome) => format!(
            "* {} (you are {}, {} online)",
            welcome.message, welcome.id, welcome.connected
        ),
        ServerEvent::History(entries) => format!("* history: {} message(s)", entries.len()),
        ServerEvent::Clients(ids) => {
            let names: Vec<&str> = ids.iter().map(|id| id.short()).collect();
            format!("* online: {}", names.join(", "))
        }
        ServerEvent::Joined(id) => format!("+ {} joined", id.short()),
        ServerEvent::Left(id) => format!("- {} left", id.short()),
        ServerEvent::Relayed(envelope) => render_envelope(envelope, state),
    }
}

/// Renders a message envelope: type, compact payload, then metadata.
pub fn render_envelope(envelope: &Envelope, state: &ClientState) -> String {
    let mut line = format!("[{}]", envelope.kind());

    if let Some(payload) = envelope.payload() {
        line.push(' ');
        match payload.as_str() {
            Some(text) => line.push_str(text),
            None => line.push_str(&payload.to_string()),
        }
    }

    if let Some(meta) = envelope.meta() {
        let described = describe_meta(meta, state.origin_of(envelope));
        if !described.is_empty() {
            line.push_str("  (");
            line.push_str(&described);
            line.push(')');
        }
    }

    line
}

fn describe_meta(meta: &Meta, origin: Origin) -> String {
    let mut parts = Vec::new();

    match (origin, &meta.sender_id) {
        (Origin::Own, _) => parts.push("you".to_string()),
        (_, Some(sender)) => parts.push(format!("from {}", sender.short())),
        (_, None) => {}
    }
    if let Some(sent_at) = meta.sent_at {
        parts.push(sent_at.format("%H:%M:%S").to_string());
    }
    if let Some(origin) = &meta.origin {
        parts.push(format!("via {origin}"));
    }

    parts.join(" • ")
}
