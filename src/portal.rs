//! Page-level wiring.
//!
//! SYSTEM CONTEXT
//! ==============
//! [`ChatPortal`] is what a host creates once per page load. It builds the
//! backend client, the chat controller, the unread tracker and the
//! notification center, and owns the global poll that keeps badges and the
//! topbar fresh. Hosts forward page events through its `on_*` hooks.
//!
//! The global poll refreshes immediately, then on its cadence, and whenever
//! the page becomes visible or the window regains focus. Triggers that pile up
//! while a refresh is running fold into a single follow-up refresh. Dropping
//! the portal stops the poll.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::api::{ChatBackend, HttpBackend};
use crate::badges::UnreadTracker;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::notify::NotificationCenter;
use crate::page::PageContext;
use crate::schedule::ScheduledTask;
use crate::session::ChatController;
use crate::surface::{BadgeSurface, ChatSurface, TopbarSurface};

/// The host's implementations of the three page components.
#[derive(Clone)]
pub struct PageSurfaces {
    pub chat: Arc<dyn ChatSurface>,
    pub badges: Arc<dyn BadgeSurface>,
    pub topbar: Arc<dyn TopbarSurface>,
}

pub struct ChatPortal {
    controller: Arc<ChatController>,
    unread: Arc<UnreadTracker>,
    notifications: Arc<NotificationCenter>,
    trigger: Arc<Notify>,
    _global_poll: ScheduledTask,
}

impl ChatPortal {
    /// Wire the page against the HTTP backend at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn start(config: &ChatConfig, page: &PageContext, surfaces: PageSurfaces) -> Result<Self, ChatError> {
        let backend = HttpBackend::new(config, page)?;
        Ok(Self::with_backend(Arc::new(backend), config, page, surfaces))
    }

    /// Wire the page against any backend. Must be called from within a tokio
    /// runtime; the first refresh is scheduled immediately.
    pub fn with_backend(
        backend: Arc<dyn ChatBackend>,
        config: &ChatConfig,
        page: &PageContext,
        surfaces: PageSurfaces,
    ) -> Self {
        let unread = Arc::new(UnreadTracker::new(Arc::clone(&backend), surfaces.badges, config.badge_cap));
        let controller = ChatController::new(Arc::clone(&backend), surfaces.chat, Arc::clone(&unread), page, config);
        let notifications = Arc::new(NotificationCenter::new(backend, surfaces.topbar));
        let trigger = Arc::new(Notify::new());

        let weak_unread: Weak<UnreadTracker> = Arc::downgrade(&unread);
        let weak_notifications: Weak<NotificationCenter> = Arc::downgrade(&notifications);
        let global_poll = ScheduledTask::every_or_triggered(
            "chat-global-poll",
            config.global_poll_interval,
            Arc::clone(&trigger),
            move || {
                let (unread, notifications) = (weak_unread.clone(), weak_notifications.clone());
                async move {
                    let (Some(unread), Some(notifications)) = (unread.upgrade(), notifications.upgrade()) else {
                        return ControlFlow::Break(());
                    };
                    refresh_page(&unread, &notifications).await;
                    ControlFlow::Continue(())
                }
            },
        );

        info!(
            user_id = ?page.user_id,
            thread_poll_ms = config.thread_poll_interval.as_millis(),
            global_poll_ms = config.global_poll_interval.as_millis(),
            "chat portal started"
        );
        Self { controller, unread, notifications, trigger, _global_poll: global_poll }
    }

    #[must_use]
    pub fn controller(&self) -> &Arc<ChatController> {
        &self.controller
    }

    #[must_use]
    pub fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// `visibilitychange`: becoming visible schedules a refresh.
    pub fn on_visibility_change(&self, hidden: bool) {
        if !hidden {
            debug!("page visible; refresh requested");
            self.trigger.notify_one();
        }
    }

    /// Window `focus`: schedules a refresh.
    pub fn on_window_focus(&self) {
        debug!("window focused; refresh requested");
        self.trigger.notify_one();
    }

    /// The chat modal was hidden.
    pub fn on_modal_hidden(&self) {
        self.controller.close_chat();
    }

    /// A chat notification in the topbar dropdown was clicked.
    ///
    /// # Errors
    ///
    /// Returns the chat initialization error, if any.
    pub async fn on_notification_click(&self, message_id: i64) -> Result<(), ChatError> {
        self.notifications
            .on_chat_notification_click(message_id, &self.controller)
            .await
    }

    /// Refresh badges and the topbar now, outside the poll cadence.
    pub async fn refresh_now(&self) {
        refresh_page(&self.unread, &self.notifications).await;
    }
}

/// Per-entry badges first, then the topbar feed. Failures are logged by the
/// components and retried on the next refresh.
async fn refresh_page(unread: &UnreadTracker, notifications: &NotificationCenter) {
    unread.refresh().await;
    let _ = notifications.refresh().await;
}

#[cfg(test)]
#[path = "portal_test.rs"]
mod tests;
