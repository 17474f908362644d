//! Message render pipeline.
//!
//! DESIGN
//! ======
//! Rendering is a pure function of the message list and the current user id:
//! no caches, no counters, so a reload can re-derive the whole container at
//! any time. Messages keep the backend's order. Every piece of server- or
//! user-supplied text passes through [`escape_html`] before it is embedded.

use std::fmt::Write;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::types::{Attachment, AttachmentKind, Message, ParentMessage, Sender, SenderRole};

pub const REPLY_PREVIEW_CHARS: usize = 100;
pub const UNKNOWN_SENDER: &str = "Unknown User";
const ATTACHMENT_ROUTE: &str = "/chat/attachment/";

// =============================================================================
// TEXT HELPERS
// =============================================================================

/// Escape text for use in HTML content and double- or single-quoted attributes.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Cut `text` to `max_chars` characters, appending `...` when something was cut.
#[must_use]
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

/// Display name: `name`, then `username`, then [`UNKNOWN_SENDER`].
#[must_use]
pub fn sender_display_name(sender: Option<&Sender>) -> &str {
    sender
        .and_then(|s| {
            s.name
                .as_deref()
                .filter(|n| !n.is_empty())
                .or_else(|| s.username.as_deref().filter(|n| !n.is_empty()))
        })
        .unwrap_or(UNKNOWN_SENDER)
}

/// Role badge text and CSS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleBadge {
    pub class: &'static str,
    pub label: &'static str,
}

/// Badge for a role; unknown or missing roles get none.
#[must_use]
pub fn role_badge(role: Option<SenderRole>) -> Option<RoleBadge> {
    match role? {
        SenderRole::Customer => Some(RoleBadge { class: "role-customer", label: "Customer" }),
        SenderRole::User => Some(RoleBadge { class: "role-company", label: "CHA Admin" }),
        SenderRole::BaseUser => Some(RoleBadge { class: "role-company", label: "CHA User" }),
        SenderRole::Unknown => None,
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339) {
        return Some(PrimitiveDateTime::new(dt.date(), dt.time()));
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    ) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Some(dt);
    }
    OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc2822)
        .ok()
        .map(|dt| PrimitiveDateTime::new(dt.date(), dt.time()))
}

/// Message timestamp as `YYYY-MM-DD HH:MM`, escaped raw text when unparseable,
/// empty when absent. Times are shown as the backend sent them.
#[must_use]
pub fn format_message_time(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return String::new();
    };
    parse_timestamp(raw)
        .and_then(|dt| {
            dt.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| escape_html(raw))
}

/// Notification timestamp as `MM/DD/YYYY, HH:MM`, `N/A` when absent.
#[must_use]
pub fn format_notification_time(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return "N/A".to_owned();
    };
    parse_timestamp(raw)
        .and_then(|dt| {
            dt.format(format_description!("[month]/[day]/[year], [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| escape_html(raw))
}

// =============================================================================
// PLACEHOLDERS
// =============================================================================

pub const LOADING_HTML: &str = r#"<div class="text-center my-3"><div class="spinner-border text-primary" role="status"><span class="visually-hidden">Loading messages...</span></div></div>"#;

pub const EMPTY_THREAD_HTML: &str =
    r#"<div class="text-center text-muted my-3"><p>No messages yet. Start a conversation!</p></div>"#;

pub const LOAD_FAILED_HTML: &str = r#"<div class="text-center text-danger my-3"><p>Unable to load messages. Please try again later.</p></div>"#;

// =============================================================================
// MESSAGE FRAGMENTS
// =============================================================================

/// Markup for one attachment. Exhaustive over [`AttachmentKind`].
#[must_use]
pub fn render_attachment(attachment: &Attachment, is_sender: bool) -> String {
    let src = escape_html(&format!("{ATTACHMENT_ROUTE}{}", attachment.file_path));
    match attachment.kind() {
        AttachmentKind::Audio => format!(
            r#"<div class="audio-attachment"><audio controls class="w-100"><source src="{src}" type="audio/mpeg">Your browser does not support audio playback.</audio></div>"#
        ),
        AttachmentKind::Image => format!(
            r#"<div class="image-attachment"><a href="{src}" target="_blank" rel="noopener"><img src="{src}" class="img-thumbnail" style="max-width: 200px; max-height: 200px;"></a></div>"#
        ),
        AttachmentKind::Other => {
            let name = attachment
                .file_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or("Attachment");
            format!(
                r#"<div class="file-attachment"><a href="{src}" target="_blank" rel="noopener" class="btn btn-sm {}"><i class="ri-file-line me-1"></i>{}</a></div>"#,
                outline_class(is_sender),
                escape_html(name)
            )
        }
    }
}

/// "Replying to …" block with the parent body cut to [`REPLY_PREVIEW_CHARS`].
#[must_use]
pub fn render_reply_preview(parent: &ParentMessage, is_sender: bool) -> String {
    let who = escape_html(sender_display_name(parent.sender.as_ref()));
    let text = escape_html(&truncate_preview(
        parent.body.as_deref().unwrap_or_default(),
        REPLY_PREVIEW_CHARS,
    ));
    let tone = if is_sender { "text-primary" } else { "text-info" };
    format!(
        r#"<div class="reply-preview mb-1 p-2 rounded bg-light {tone}"><div class="text-muted small mb-1"><i class="ri-reply-line me-1"></i>Replying to {who}</div><div class="parent-message-text small">{text}</div></div>"#
    )
}

fn outline_class(is_sender: bool) -> &'static str {
    if is_sender { "btn-outline-primary" } else { "btn-outline-info" }
}

/// Markup for one message.
#[must_use]
pub fn render_message(message: &Message, current_user_id: Option<i64>) -> String {
    let is_sender = message.is_from(current_user_id);
    let sender = message.sender.as_ref();
    let body = message.body.as_deref().unwrap_or_default();

    let mut html = String::new();
    let (align, border) = if is_sender {
        ("justify-content-end", "border-primary text-primary")
    } else {
        ("justify-content-start", "border-info text-info")
    };
    let _ = write!(
        html,
        r#"<div class="chat-message d-flex {align} mb-2" data-message-id="{}"><div class="message-content p-2 rounded bg-white border {border}" style="max-width: 70%;">"#,
        message.id
    );

    if message.parent_message_id.is_some() {
        if let Some(parent) = &message.parent_message {
            html.push_str(&render_reply_preview(parent, is_sender));
        }
    }

    let _ = write!(
        html,
        r#"<div class="message-header mb-1"><span class="sender-name fw-bold">{}</span>"#,
        escape_html(sender_display_name(sender))
    );
    if let Some(badge) = role_badge(sender.and_then(|s| s.role)) {
        let _ = write!(html, r#"<span class="role-label {} ms-2">{}</span>"#, badge.class, badge.label);
    }
    html.push_str("</div>");

    let _ = write!(html, r#"<div class="message-text">{}</div>"#, escape_html(body));

    if !message.attachments.is_empty() {
        html.push_str(r#"<div class="mt-1">"#);
        for attachment in &message.attachments {
            html.push_str(&render_attachment(attachment, is_sender));
        }
        html.push_str("</div>");
    }

    let _ = write!(
        html,
        r#"<div class="message-time text-muted mt-1 d-flex justify-content-between align-items-center"><span class="small">{}</span><button type="button" class="btn btn-sm {} reply-button" data-message-id="{}" data-message-text="{}"><i class="ri-reply-line"></i></button></div></div></div>"#,
        format_message_time(message.created_at.as_deref()),
        outline_class(is_sender),
        message.id,
        escape_html(body)
    );
    html
}

/// One fragment per message, in the order given.
#[must_use]
pub fn render_messages(messages: &[Message], current_user_id: Option<i64>) -> Vec<String> {
    messages
        .iter()
        .map(|m| render_message(m, current_user_id))
        .collect()
}

/// Full message container content, or the empty-thread placeholder.
#[must_use]
pub fn render_thread(messages: &[Message], current_user_id: Option<i64>) -> String {
    if messages.is_empty() {
        return EMPTY_THREAD_HTML.to_owned();
    }
    render_messages(messages, current_user_id).concat()
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
