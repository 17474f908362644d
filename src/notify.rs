//! Topbar notification aggregation.
//!
//! DESIGN
//! ======
//! The backend returns the full notification snapshot on every fetch. The
//! center keeps the latest one, replaces it wholesale on each refresh (older
//! refreshes that finish late are dropped) and re-renders counters, tab
//! labels and both dropdown tabs from it. [`render_feed`] is pure.
//!
//! Clicking a chat notification opens that entry's chat and removes the item
//! locally; the backend catches up on the next refresh.

use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::api::ChatBackend;
use crate::error::ChatError;
use crate::page::EntryRef;
use crate::render::{escape_html, format_notification_time};
use crate::session::ChatController;
use crate::surface::{DropdownTab, TabLabels, TopbarBadges, TopbarSurface};
use crate::types::{NotificationFeed, NotificationItem, WireId};

pub const NO_NOTIFICATIONS_HTML: &str = r#"<div class="w-100 text-center py-4"><div class="avatar-md mx-auto mb-4"><div class="avatar-title bg-light text-secondary rounded-circle fs-24"><i class="ri-notification-off-line"></i></div></div><h5 class="mb-1">No Notifications</h5><p class="text-muted">You're all caught up! No pending notifications.</p></div>"#;

pub const NO_MESSAGES_HTML: &str = r#"<div class="w-100 text-center py-4"><div class="avatar-md mx-auto mb-4"><div class="avatar-title bg-light text-secondary rounded-circle fs-24"><i class="ri-message-2-line"></i></div></div><h5 class="mb-1">No Messages</h5><p class="text-muted">No new chat messages.</p></div>"#;

const QUESTIONNAIRE_ROUTE: &str = "/main/list_responses";
const SAFETY_ROUTE: &str = "/main/monthly_safety_reviews";

// =============================================================================
// RENDERING
// =============================================================================

/// Everything the topbar shows for one feed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedView {
    /// `None` hides both counters.
    pub badges: Option<TopbarBadges>,
    pub tabs: TabLabels,
    pub all_html: String,
    pub messages_html: String,
}

fn topbar_badges(total: u32) -> Option<TopbarBadges> {
    (total > 0).then(|| TopbarBadges { count: total.to_string(), text: format!("{total} New") })
}

fn scrollable(content: &str) -> String {
    format!(r#"<div data-simplebar style="max-height: 300px;" class="pe-2">{content}</div>"#)
}

/// Markup for one chat notification. The data attributes identify the
/// message and the entry whose chat a click opens.
#[must_use]
pub fn render_chat_item(item: &NotificationItem) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div class="text-reset notification-item d-block dropdown-item position-relative chat-notification-item" data-message-id="{}" data-thread-id="{}" data-module="{}" data-entry-id="{}">"#,
        item.id,
        escape_html(item.thread_id.as_ref().map(WireId::as_str).unwrap_or_default()),
        escape_html(&item.module_name),
        escape_html(item.entry_id.as_str()),
    );
    let _ = write!(
        html,
        r#"<div class="d-flex"><div class="avatar-xs me-3"><span class="avatar-title bg-soft-primary text-primary rounded-circle fs-16"><i class="ri-message-2-line"></i></span></div><div class="flex-1"><a href="javascript:void(0)" class="stretched-link chat-notification-link"><h6 class="mt-0 mb-2 lh-base">New message from <b>{}</b></h6><p class="mb-1 text-muted">{}</p></a><p class="mb-0 fs-11 fw-medium text-uppercase text-muted"><span><i class="mdi mdi-clock-outline"></i> {}</span>"#,
        escape_html(item.sender_name.as_deref().unwrap_or_default()),
        escape_html(item.message.as_deref().unwrap_or_default()),
        format_notification_time(item.timestamp.as_deref()),
    );
    if let Some(serial) = item.docserial.as_deref().filter(|s| !s.is_empty()) {
        let _ = write!(
            html,
            r#"<span class="ms-2"><i class="ri-file-text-line"></i> {}</span>"#,
            escape_html(serial)
        );
    }
    html.push_str("</p></div></div></div>");
    html
}

fn render_review_summary(tone: &str, icon: &str, href: &str, count: usize, what: &str) -> String {
    format!(
        r#"<div class="text-reset notification-item d-block dropdown-item"><div class="d-flex"><div class="flex-shrink-0 avatar-xs me-3"><span class="avatar-title bg-soft-{tone} text-{tone} rounded-circle fs-16"><i class="{icon}"></i></span></div><div class="flex-1"><a href="{href}" class="stretched-link"><h6 class="mt-0 mb-2 fs-13 lh-base">You have <b class="text-danger">{count}</b> {what}</h6></a><p class="mb-0 fs-11 fw-medium text-uppercase text-muted"><span><i class="mdi mdi-clock-outline"></i> Review Required</span></p></div></div></div>"#
    )
}

/// Render a feed snapshot.
#[must_use]
pub fn render_feed(feed: &NotificationFeed) -> FeedView {
    let total = feed.total();
    let tabs = TabLabels {
        all: format!("All ({total})"),
        messages: format!("Messages ({})", feed.chat()),
        alerts: format!("Alerts ({})", feed.alerts()),
    };

    let chat_items: String = feed.chat_notifications.iter().map(render_chat_item).collect();

    let all_html = if total > 0 {
        let mut content = chat_items.clone();
        if !feed.questionnaire_reviews.is_empty() {
            content.push_str(&render_review_summary(
                "warning",
                "ri-questionnaire-line",
                QUESTIONNAIRE_ROUTE,
                feed.questionnaire_reviews.len(),
                "RIR responses pending review",
            ));
        }
        if !feed.monthly_safety_reviews.is_empty() {
            content.push_str(&render_review_summary(
                "info",
                "ri-shield-check-line",
                SAFETY_ROUTE,
                feed.monthly_safety_reviews.len(),
                "monthly safety reviews pending",
            ));
        }
        scrollable(&content)
    } else {
        NO_NOTIFICATIONS_HTML.to_owned()
    };

    let messages_html = if feed.chat_notifications.is_empty() {
        NO_MESSAGES_HTML.to_owned()
    } else {
        scrollable(&chat_items)
    };

    FeedView { badges: topbar_badges(total), tabs, all_html, messages_html }
}

// =============================================================================
// CENTER
// =============================================================================

#[derive(Default)]
struct CenterState {
    next_seq: u64,
    applied_seq: u64,
    feed: NotificationFeed,
    displayed_total: u32,
}

pub struct NotificationCenter {
    backend: Arc<dyn ChatBackend>,
    topbar: Arc<dyn TopbarSurface>,
    state: Mutex<CenterState>,
}

impl NotificationCenter {
    pub fn new(backend: Arc<dyn ChatBackend>, topbar: Arc<dyn TopbarSurface>) -> Self {
        Self { backend, topbar, state: Mutex::new(CenterState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Latest feed snapshot, including local removals.
    #[must_use]
    pub fn feed(&self) -> NotificationFeed {
        self.state().feed.clone()
    }

    /// Count currently shown on the topbar badge.
    #[must_use]
    pub fn displayed_total(&self) -> u32 {
        self.state().displayed_total
    }

    /// Fetch the feed and re-render the topbar.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the topbar keeps its previous content.
    pub async fn refresh(&self) -> Result<(), ChatError> {
        let seq = {
            let mut state = self.state();
            state.next_seq += 1;
            state.next_seq
        };

        let feed = match self.backend.fetch_notifications().await {
            Ok(feed) => feed,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "notification refresh failed");
                return Err(e);
            }
        };

        let view = render_feed(&feed);
        {
            let mut state = self.state();
            if seq <= state.applied_seq {
                debug!(seq, applied = state.applied_seq, "discarding stale notification feed");
                return Ok(());
            }
            state.applied_seq = seq;
            state.displayed_total = feed.total();
            state.feed = feed;
        }
        self.show(&view);
        Ok(())
    }

    fn show(&self, view: &FeedView) {
        self.topbar.set_badges(view.badges.as_ref());
        self.topbar.set_tab_labels(&view.tabs);
        self.topbar.set_dropdown(DropdownTab::All, &view.all_html);
        self.topbar.set_dropdown(DropdownTab::Messages, &view.messages_html);
    }

    /// Handle a click on the chat notification for `message_id`: mark it read
    /// in the background, open its chat, drop the item and its count locally,
    /// then wait for the thread to resolve. Unknown ids are ignored.
    ///
    /// Feed refreshes in flight at the time of the click are discarded.
    ///
    /// # Errors
    ///
    /// Returns the chat initialization error, if any.
    pub async fn on_chat_notification_click(
        &self,
        message_id: i64,
        controller: &Arc<ChatController>,
    ) -> Result<(), ChatError> {
        let Some(item) = self
            .state()
            .feed
            .chat_notifications
            .iter()
            .find(|n| n.id == message_id)
            .cloned()
        else {
            debug!(message_id, "click on unknown notification ignored");
            return Ok(());
        };

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            match backend.mark_message_read(message_id).await {
                Ok(()) => debug!(message_id, "notification message marked read"),
                Err(e) => warn!(error = %e, code = e.error_code(), message_id, "mark message read failed"),
            }
        });

        let entry = EntryRef::new(item.module_name.as_str(), item.entry_id.as_str());
        let generation = controller.begin_session(entry.clone());

        let (remaining, chat_left) = {
            let mut state = self.state();
            state.applied_seq = state.next_seq;
            state.feed.chat_notifications.retain(|n| n.id != message_id);
            state.feed.chat_count = state.feed.chat_count.map(|n| n.saturating_sub(1));
            state.feed.total_count = state.feed.total_count.map(|n| n.saturating_sub(1));
            state.displayed_total = state.displayed_total.saturating_sub(1);
            (state.displayed_total, state.feed.chat_notifications.len())
        };

        self.topbar.remove_notification_item(message_id);
        self.topbar.set_badges(topbar_badges(remaining).as_ref());
        if remaining == 0 {
            self.topbar.set_dropdown(DropdownTab::All, NO_NOTIFICATIONS_HTML);
        }
        if chat_left == 0 {
            self.topbar.set_dropdown(DropdownTab::Messages, NO_MESSAGES_HTML);
        }
        info!(message_id, entry = %entry, remaining, "chat notification opened");

        controller.initialize_chat(generation, entry).await
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
