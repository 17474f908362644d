//! In-memory backend and recording surfaces shared by the controller tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::ChatBackend;
use crate::badges::UnreadTracker;
use crate::compose::OutgoingMessage;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::page::{EntryRef, PageContext};
use crate::session::ChatController;
use crate::surface::{
    BadgeSurface, ChatSurface, DropdownTab, RecordingClock, TabLabels, TopbarBadges, TopbarSurface,
};
use crate::types::{Message, NewMessagesCheck, NotificationFeed, ThreadInfo, WireId};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Resolve(EntryRef),
    Fetch(String),
    Check(EntryRef),
    MarkAll(EntryRef),
    MarkOne(i64),
    Send(EntryRef, OutgoingMessage),
    Notifications,
}

fn server_error() -> ChatError {
    ChatError::Status { status: 500, body: "boom".into() }
}

#[derive(Default)]
pub(crate) struct MockBackend {
    threads: Mutex<HashMap<EntryRef, String>>,
    failing_threads: Mutex<HashSet<EntryRef>>,
    gates: Mutex<HashMap<EntryRef, Arc<Notify>>>,
    fetch_gates: Mutex<HashMap<String, VecDeque<Arc<Notify>>>>,
    check_gates: Mutex<HashMap<EntryRef, VecDeque<Arc<Notify>>>>,
    feed_gates: Mutex<VecDeque<Arc<Notify>>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    failing_fetches: Mutex<HashSet<String>>,
    checks: Mutex<HashMap<EntryRef, NewMessagesCheck>>,
    failing_checks: Mutex<HashSet<EntryRef>>,
    send_rejection: Mutex<Option<String>>,
    failing_marks: Mutex<bool>,
    feed: Mutex<NotificationFeed>,
    calls: Mutex<Vec<Call>>,
}

impl MockBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| wanted(c)).count()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    pub(crate) fn with_thread(&self, entry: &EntryRef, thread_id: &str) {
        self.threads.lock().expect("lock").insert(entry.clone(), thread_id.to_owned());
    }

    pub(crate) fn fail_thread(&self, entry: &EntryRef) {
        self.failing_threads.lock().expect("lock").insert(entry.clone());
    }

    /// Hold `resolve_thread` for `entry` until the returned gate is notified.
    pub(crate) fn gate_thread(&self, entry: &EntryRef) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().expect("lock").insert(entry.clone(), Arc::clone(&gate));
        gate
    }

    /// Hold the next `fetch_messages` for `thread_id` until the gate is
    /// notified. Gates are consumed in call order; the response is the
    /// message list as it stood when the call was made.
    pub(crate) fn gate_fetch(&self, thread_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.fetch_gates
            .lock()
            .expect("lock")
            .entry(thread_id.to_owned())
            .or_default()
            .push_back(Arc::clone(&gate));
        gate
    }

    /// Hold the next `check_new_messages` for `entry`, answering with the
    /// check configured at call time.
    pub(crate) fn gate_check(&self, entry: &EntryRef) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.check_gates
            .lock()
            .expect("lock")
            .entry(entry.clone())
            .or_default()
            .push_back(Arc::clone(&gate));
        gate
    }

    /// Hold the next `fetch_notifications`, answering with the feed
    /// configured at call time.
    pub(crate) fn gate_feed(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.feed_gates.lock().expect("lock").push_back(Arc::clone(&gate));
        gate
    }

    pub(crate) fn with_messages(&self, thread_id: &str, messages: Vec<Message>) {
        self.messages.lock().expect("lock").insert(thread_id.to_owned(), messages);
    }

    pub(crate) fn fail_fetch(&self, thread_id: &str) {
        self.failing_fetches.lock().expect("lock").insert(thread_id.to_owned());
    }

    pub(crate) fn with_check(&self, entry: &EntryRef, new_messages_exist: bool, unread_count: Option<u32>) {
        let check = NewMessagesCheck { success: true, new_messages_exist, unread_count };
        self.checks.lock().expect("lock").insert(entry.clone(), check);
    }

    pub(crate) fn fail_check(&self, entry: &EntryRef) {
        self.failing_checks.lock().expect("lock").insert(entry.clone());
    }

    pub(crate) fn heal_check(&self, entry: &EntryRef) {
        self.failing_checks.lock().expect("lock").remove(entry);
    }

    pub(crate) fn reject_sends(&self, reason: &str) {
        *self.send_rejection.lock().expect("lock") = Some(reason.to_owned());
    }

    pub(crate) fn fail_marks(&self) {
        *self.failing_marks.lock().expect("lock") = true;
    }

    pub(crate) fn with_feed(&self, feed: NotificationFeed) {
        *self.feed.lock().expect("lock") = feed;
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn resolve_thread(&self, entry: &EntryRef) -> Result<ThreadInfo, ChatError> {
        self.record(Call::Resolve(entry.clone()));
        let gate = self.gates.lock().expect("lock").get(entry).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing_threads.lock().expect("lock").contains(entry) {
            return Err(server_error());
        }
        let thread_id = self
            .threads
            .lock()
            .expect("lock")
            .get(entry)
            .cloned()
            .unwrap_or_else(|| format!("t-{}", entry.entry_id));
        Ok(ThreadInfo { thread_id: WireId(thread_id) })
    }

    async fn fetch_messages(&self, thread_id: &str) -> Result<Vec<Message>, ChatError> {
        self.record(Call::Fetch(thread_id.to_owned()));
        let failing = self.failing_fetches.lock().expect("lock").contains(thread_id);
        let messages = self.messages.lock().expect("lock").get(thread_id).cloned().unwrap_or_default();
        let gate = self
            .fetch_gates
            .lock()
            .expect("lock")
            .get_mut(thread_id)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if failing {
            return Err(server_error());
        }
        Ok(messages)
    }

    async fn check_new_messages(&self, entry: &EntryRef) -> Result<NewMessagesCheck, ChatError> {
        self.record(Call::Check(entry.clone()));
        let failing = self.failing_checks.lock().expect("lock").contains(entry);
        let check = self
            .checks
            .lock()
            .expect("lock")
            .get(entry)
            .copied()
            .unwrap_or(NewMessagesCheck { success: true, new_messages_exist: false, unread_count: Some(0) });
        let gate = self
            .check_gates
            .lock()
            .expect("lock")
            .get_mut(entry)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if failing {
            return Err(server_error());
        }
        Ok(check)
    }

    async fn mark_messages_read(&self, entry: &EntryRef) -> Result<(), ChatError> {
        self.record(Call::MarkAll(entry.clone()));
        if *self.failing_marks.lock().expect("lock") {
            return Err(server_error());
        }
        Ok(())
    }

    async fn mark_message_read(&self, message_id: i64) -> Result<(), ChatError> {
        self.record(Call::MarkOne(message_id));
        if *self.failing_marks.lock().expect("lock") {
            return Err(server_error());
        }
        Ok(())
    }

    async fn send_message(&self, entry: &EntryRef, outgoing: &OutgoingMessage) -> Result<(), ChatError> {
        self.record(Call::Send(entry.clone(), outgoing.clone()));
        match self.send_rejection.lock().expect("lock").clone() {
            Some(reason) => Err(ChatError::Rejected(reason)),
            None => Ok(()),
        }
    }

    async fn fetch_notifications(&self) -> Result<NotificationFeed, ChatError> {
        self.record(Call::Notifications);
        let feed = self.feed.lock().expect("lock").clone();
        let gate = self.feed_gates.lock().expect("lock").pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(feed)
    }
}

// =============================================================================
// SURFACES
// =============================================================================

/// Everything the controller did to the chat modal, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChatEvent {
    ShowModal,
    ThreadId(String),
    Html(String),
    Scroll,
    ReplyPreview(Option<String>),
    AttachmentPreview(Option<String>),
    Recording(Option<RecordingClock>),
    ResetForm,
    Error(String),
}

pub(crate) struct RecordingChatSurface {
    visible: Mutex<bool>,
    events: Mutex<Vec<ChatEvent>>,
}

impl RecordingChatSurface {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { visible: Mutex::new(true), events: Mutex::new(Vec::new()) })
    }

    fn push(&self, event: ChatEvent) {
        self.events.lock().expect("events lock").push(event);
    }

    pub(crate) fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().expect("events lock").clear();
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        *self.visible.lock().expect("visible lock") = visible;
    }

    /// Most recent message container content.
    pub(crate) fn last_html(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            ChatEvent::Html(html) => Some(html),
            _ => None,
        })
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }
}

impl ChatSurface for RecordingChatSurface {
    fn show_modal(&self) {
        self.push(ChatEvent::ShowModal);
    }

    fn is_modal_visible(&self) -> bool {
        *self.visible.lock().expect("visible lock")
    }

    fn set_thread_id(&self, thread_id: &str) {
        self.push(ChatEvent::ThreadId(thread_id.to_owned()));
    }

    fn set_message_html(&self, html: &str) {
        self.push(ChatEvent::Html(html.to_owned()));
    }

    fn scroll_to_bottom(&self) {
        self.push(ChatEvent::Scroll);
    }

    fn set_reply_preview(&self, preview: Option<&str>) {
        self.push(ChatEvent::ReplyPreview(preview.map(str::to_owned)));
    }

    fn set_attachment_preview(&self, file_name: Option<&str>) {
        self.push(ChatEvent::AttachmentPreview(file_name.map(str::to_owned)));
    }

    fn set_recording_clock(&self, clock: Option<&RecordingClock>) {
        self.push(ChatEvent::Recording(clock.cloned()));
    }

    fn reset_compose_form(&self) {
        self.push(ChatEvent::ResetForm);
    }

    fn show_error(&self, message: &str) {
        self.push(ChatEvent::Error(message.to_owned()));
    }
}

#[derive(Default)]
pub(crate) struct RecordingBadges {
    entries: Mutex<Vec<EntryRef>>,
    labels: Mutex<HashMap<EntryRef, Option<String>>>,
    writes: Mutex<usize>,
}

impl RecordingBadges {
    pub(crate) fn with_entries(entries: &[EntryRef]) -> Arc<Self> {
        let badges = Self::default();
        *badges.entries.lock().expect("lock") = entries.to_vec();
        Arc::new(badges)
    }

    /// Label last written for `entry`; `None` if never touched.
    pub(crate) fn label(&self, entry: &EntryRef) -> Option<Option<String>> {
        self.labels.lock().expect("lock").get(entry).cloned()
    }

    pub(crate) fn writes(&self) -> usize {
        *self.writes.lock().expect("lock")
    }
}

impl BadgeSurface for RecordingBadges {
    fn chat_entries(&self) -> Vec<EntryRef> {
        self.entries.lock().expect("lock").clone()
    }

    fn set_badge(&self, entry: &EntryRef, label: Option<&str>) {
        *self.writes.lock().expect("lock") += 1;
        self.labels
            .lock()
            .expect("lock")
            .insert(entry.clone(), label.map(str::to_owned));
    }
}

#[derive(Default)]
pub(crate) struct RecordingTopbar {
    pub(crate) badges: Mutex<Vec<Option<TopbarBadges>>>,
    pub(crate) tabs: Mutex<Vec<TabLabels>>,
    pub(crate) dropdown: Mutex<HashMap<DropdownTab, String>>,
    pub(crate) removed: Mutex<Vec<i64>>,
}

impl RecordingTopbar {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn last_badges(&self) -> Option<Option<TopbarBadges>> {
        self.badges.lock().expect("lock").last().cloned()
    }

    pub(crate) fn last_tabs(&self) -> Option<TabLabels> {
        self.tabs.lock().expect("lock").last().cloned()
    }

    pub(crate) fn tab_html(&self, tab: DropdownTab) -> String {
        self.dropdown.lock().expect("lock").get(&tab).cloned().unwrap_or_default()
    }

    pub(crate) fn removed(&self) -> Vec<i64> {
        self.removed.lock().expect("lock").clone()
    }
}

impl TopbarSurface for RecordingTopbar {
    fn set_badges(&self, badges: Option<&TopbarBadges>) {
        self.badges.lock().expect("lock").push(badges.cloned());
    }

    fn set_tab_labels(&self, labels: &TabLabels) {
        self.tabs.lock().expect("lock").push(labels.clone());
    }

    fn set_dropdown(&self, tab: DropdownTab, html: &str) {
        self.dropdown.lock().expect("lock").insert(tab, html.to_owned());
    }

    fn remove_notification_item(&self, message_id: i64) {
        self.removed.lock().expect("lock").push(message_id);
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub(crate) struct Harness {
    pub(crate) backend: Arc<MockBackend>,
    pub(crate) surface: Arc<RecordingChatSurface>,
    pub(crate) badges: Arc<RecordingBadges>,
    pub(crate) unread: Arc<UnreadTracker>,
    pub(crate) controller: Arc<ChatController>,
}

pub(crate) fn harness(entries: &[EntryRef]) -> Harness {
    let backend = MockBackend::new();
    let surface = RecordingChatSurface::new();
    let badges = RecordingBadges::with_entries(entries);
    let config = ChatConfig::default();
    let unread = Arc::new(UnreadTracker::new(backend.clone(), badges.clone(), config.badge_cap));
    let page = PageContext { user_id: Some(1), user_name: Some("Ops".into()), csrf_token: Some("tok".into()) };
    let controller = ChatController::new(backend.clone(), surface.clone(), Arc::clone(&unread), &page, &config);
    Harness { backend, surface, badges, unread, controller }
}

pub(crate) fn message(id: i64, sender_id: i64, body: &str) -> Message {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "sender": {"id": sender_id, "name": "Ana", "role": "customer"},
        "message": body,
        "created_at": "2024-03-01T09:15:00"
    }))
    .expect("fixture message decodes")
}

/// Let spawned tasks run to their next await point.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
