//! Host surfaces: the page components the chat client drives.
//!
//! DESIGN
//! ======
//! Each component owns its own surface trait scoped to its own root element
//! (the chat modal, the per-entry chat buttons, the topbar dropdown). The
//! client never reaches into another component's markup, and hosts route
//! page events to the owning component instead of one document-wide click
//! handler. Implementations must be cheap and non-blocking; they are called
//! from async tasks between backend round-trips.

use crate::page::EntryRef;

/// Recording indicator state shown while a voice message is being captured.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingClock {
    /// `MM:SS` elapsed label.
    pub label: String,
    /// Progress towards the maximum recording length, `0.0..=100.0`.
    pub progress_percent: f32,
}

/// The chat modal: message container, compose form and previews.
pub trait ChatSurface: Send + Sync {
    /// Show the modal.
    fn show_modal(&self);

    /// Whether the modal is currently shown. Poll ticks are skipped otherwise.
    fn is_modal_visible(&self) -> bool;

    /// Reflect the resolved thread id (the compose form's hidden field).
    fn set_thread_id(&self, thread_id: &str);

    /// Replace the message container's content.
    fn set_message_html(&self, html: &str);

    fn scroll_to_bottom(&self);

    /// Show the "replying to" preview, or hide it with `None`.
    fn set_reply_preview(&self, preview: Option<&str>);

    /// Show the staged attachment's file name, or hide the preview with `None`.
    fn set_attachment_preview(&self, file_name: Option<&str>);

    /// Show the recording indicator, or hide it with `None`.
    fn set_recording_clock(&self, clock: Option<&RecordingClock>);

    /// Clear the compose form's text input.
    fn reset_compose_form(&self);

    /// Dismissible, user-facing error.
    fn show_error(&self, message: &str);
}

/// The chat buttons spread over the page, each with an unread badge.
pub trait BadgeSurface: Send + Sync {
    /// Entries that currently have a chat button with a badge.
    fn chat_entries(&self) -> Vec<EntryRef>;

    /// Show `label` on the entry's badge, or hide the badge with `None`.
    fn set_badge(&self, entry: &EntryRef, label: Option<&str>);
}

/// Which dropdown tab a block of markup belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropdownTab {
    All,
    Messages,
}

/// Text for the topbar counter and the "N New" badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopbarBadges {
    pub count: String,
    pub text: String,
}

/// Labels of the dropdown's tab headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabLabels {
    pub all: String,
    pub messages: String,
    pub alerts: String,
}

/// The topbar notification bell and its dropdown.
pub trait TopbarSurface: Send + Sync {
    /// Show the counters, or hide both with `None`.
    fn set_badges(&self, badges: Option<&TopbarBadges>);

    fn set_tab_labels(&self, labels: &TabLabels);

    /// Replace a tab's content.
    fn set_dropdown(&self, tab: DropdownTab, html: &str);

    /// Remove the chat notification item for `message_id` from every tab.
    fn remove_notification_item(&self, message_id: i64);
}
