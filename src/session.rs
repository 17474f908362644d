//! Chat thread lifecycle.
//!
//! DESIGN
//! ======
//! [`ChatController`] owns a single session slot. Opening a chat replaces
//! whatever session was there, and the replaced session takes its poll task
//! with it when it drops, so at most one thread poll is ever live.
//!
//! Every open and close bumps the slot's generation. Work that crosses a
//! backend round-trip captures the generation first and re-checks it before
//! touching the surface; a response for a session that has been closed or
//! superseded is dropped. Message loads are additionally numbered so that an
//! older load finishing after a newer one never overwrites it.
//!
//! State lives behind `std::sync::Mutex` and no guard is held across an
//! `.await`. Surface calls are made after the guard is released.
//!
//! LIFECYCLE
//! =========
//! `Closed -> Resolving -> Active (polling) -> Closed`. A failed resolution
//! goes straight back to `Closed` and surfaces an error.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ChatBackend;
use crate::badges::UnreadTracker;
use crate::compose::{Composer, StagedAttachment, VOICE_FILE_NAME, VoiceRecorder};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::page::{EntryRef, PageContext};
use crate::render::{LOAD_FAILED_HTML, LOADING_HTML, render_thread};
use crate::schedule::ScheduledTask;
use crate::surface::ChatSurface;

pub const INIT_FAILED_MESSAGE: &str = "Failed to initialize chat";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send message";

const RECORDING_CLOCK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Closed,
    /// Waiting for the backend to resolve the thread.
    Resolving,
    Active,
}

/// What one in-thread poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Modal hidden or no session.
    Skipped,
    Unchanged,
    Refreshed,
}

struct ChatSession {
    id: Uuid,
    generation: u64,
    entry: EntryRef,
    thread_id: Option<String>,
    poll: Option<ScheduledTask>,
    next_load_seq: u64,
    applied_load_seq: u64,
    loaded_once: bool,
}

impl ChatSession {
    fn new(generation: u64, entry: EntryRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            entry,
            thread_id: None,
            poll: None,
            next_load_seq: 0,
            applied_load_seq: 0,
            loaded_once: false,
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    session: Option<ChatSession>,
}

impl Slot {
    fn current(&mut self, generation: u64) -> Option<&mut ChatSession> {
        self.session.as_mut().filter(|s| s.generation == generation)
    }
}

struct Recording {
    recorder: VoiceRecorder,
    _clock: ScheduledTask,
}

pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    surface: Arc<dyn ChatSurface>,
    unread: Arc<UnreadTracker>,
    user_id: Option<i64>,
    poll_interval: Duration,
    slot: Mutex<Slot>,
    composer: Mutex<Composer>,
    recording: Mutex<Option<Recording>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ChatController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        surface: Arc<dyn ChatSurface>,
        unread: Arc<UnreadTracker>,
        page: &PageContext,
        config: &ChatConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            surface,
            unread,
            user_id: page.user_id,
            poll_interval: config.thread_poll_interval,
            slot: Mutex::new(Slot::default()),
            composer: Mutex::new(Composer::default()),
            recording: Mutex::new(None),
        })
    }

    // =========================================================================
    // STATE
    // =========================================================================

    #[must_use]
    pub fn status(&self) -> ChatStatus {
        match &guard(&self.slot).session {
            None => ChatStatus::Closed,
            Some(s) if s.thread_id.is_none() => ChatStatus::Resolving,
            Some(_) => ChatStatus::Active,
        }
    }

    #[must_use]
    pub fn active_entry(&self) -> Option<EntryRef> {
        guard(&self.slot).session.as_ref().map(|s| s.entry.clone())
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        guard(&self.slot).session.as_ref().and_then(|s| s.thread_id.clone())
    }

    /// Whether the open session has a live poll task.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        guard(&self.slot)
            .session
            .as_ref()
            .and_then(|s| s.poll.as_ref())
            .is_some_and(|p| !p.is_finished())
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        guard(&self.slot).generation
    }

    fn is_current(&self, generation: u64) -> bool {
        guard(&self.slot).current(generation).is_some()
    }

    /// Snapshot of the compose form.
    #[must_use]
    pub fn composer(&self) -> Composer {
        guard(&self.composer).clone()
    }

    // =========================================================================
    // OPEN / CLOSE
    // =========================================================================

    /// Open the chat for `module`/`reference_id` and resolve its thread.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the thread cannot be resolved or the
    /// first message load fails.
    pub async fn open_chat(self: &Arc<Self>, module: &str, reference_id: &str) -> Result<(), ChatError> {
        let entry = EntryRef::new(module, reference_id);
        let generation = self.begin_session(entry.clone());
        self.initialize_chat(generation, entry).await
    }

    /// Replace the current session with a fresh one for `entry` and apply the
    /// synchronous UI effects of opening. Returns the new generation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin_session(&self, entry: EntryRef) -> u64 {
        let (session_id, generation) = {
            let mut slot = guard(&self.slot);
            slot.generation += 1;
            let session = ChatSession::new(slot.generation, entry.clone());
            let ids = (session.id, session.generation);
            if let Some(previous) = slot.session.replace(session) {
                info!(
                    session_id = %previous.id,
                    entry = %previous.entry,
                    generation = previous.generation,
                    "chat session superseded"
                );
            }
            ids
        };

        guard(&self.composer).cancel_reply();
        self.surface.set_reply_preview(None);
        self.unread.clear(&entry);
        self.surface.show_modal();

        let backend = Arc::clone(&self.backend);
        let read_entry = entry.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.mark_messages_read(&read_entry).await {
                warn!(error = %e, code = e.error_code(), entry = %read_entry, "mark messages read failed");
            }
        });

        info!(
            session_id = %session_id,
            module = %entry.module,
            reference_id = %entry.entry_id,
            generation,
            "chat session opened"
        );
        generation
    }

    /// Resolve the thread for the session started by [`Self::begin_session`].
    ///
    /// A result for a session that is no longer current is discarded and
    /// reported as `Ok`.
    ///
    /// # Errors
    ///
    /// Returns the backend error when resolution fails for the current
    /// session, or when the first message load fails.
    pub async fn initialize_chat(self: &Arc<Self>, generation: u64, entry: EntryRef) -> Result<(), ChatError> {
        let resolved = self.backend.resolve_thread(&entry).await;

        let thread_id = match resolved {
            Ok(info) => {
                let thread_id = info.thread_id.0;
                let mut slot = guard(&self.slot);
                let Some(session) = slot.current(generation) else {
                    debug!(entry = %entry, generation, "discarding stale thread resolution");
                    return Ok(());
                };
                session.thread_id = Some(thread_id.clone());
                session.poll = Some(self.spawn_thread_poll(generation));
                thread_id
            }
            Err(e) => {
                let removed = {
                    let mut slot = guard(&self.slot);
                    if slot.current(generation).is_some() { slot.session.take() } else { None }
                };
                let Some(session) = removed else {
                    debug!(entry = %entry, generation, error = %e, "discarding stale thread failure");
                    return Ok(());
                };
                warn!(
                    session_id = %session.id,
                    error = %e,
                    code = e.error_code(),
                    entry = %entry,
                    "chat initialization failed"
                );
                self.surface.show_error(INIT_FAILED_MESSAGE);
                return Err(e);
            }
        };

        self.surface.set_thread_id(&thread_id);
        info!(entry = %entry, thread_id = %thread_id, generation, "chat thread resolved");
        self.load_generation(Some(generation)).await
    }

    fn spawn_thread_poll(self: &Arc<Self>, generation: u64) -> ScheduledTask {
        let weak: Weak<Self> = Arc::downgrade(self);
        ScheduledTask::every("chat-thread-poll", self.poll_interval, move || {
            let weak = weak.clone();
            async move {
                let Some(controller) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                if !controller.is_current(generation) {
                    return ControlFlow::Break(());
                }
                match controller.poll_tick().await {
                    Ok(outcome) => debug!(generation, ?outcome, "thread poll tick"),
                    Err(e) => warn!(error = %e, code = e.error_code(), generation, "thread poll tick failed"),
                }
                ControlFlow::Continue(())
            }
        })
    }

    /// Drop the session and its poll task. Safe to call when nothing is open.
    pub fn close_chat(&self) {
        let session = {
            let mut slot = guard(&self.slot);
            let session = slot.session.take();
            if session.is_some() {
                slot.generation += 1;
            }
            session
        };
        self.discard_recording();
        if let Some(session) = session {
            info!(
                session_id = %session.id,
                entry = %session.entry,
                generation = session.generation,
                "chat session closed"
            );
        }
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Fetch and render the open thread.
    ///
    /// The loading placeholder is only shown for a session's first load so
    /// poll-driven reloads keep the scroll position.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveSession`] / [`ChatError::NoThread`] when
    /// there is nothing to load, or the backend error after rendering the
    /// failure placeholder.
    pub async fn load_messages(&self) -> Result<(), ChatError> {
        self.load_generation(None).await
    }

    /// Load for the session `expected` names, or for whatever session is open
    /// when `None`. A load for a superseded session is skipped as `Ok`.
    async fn load_generation(&self, expected: Option<u64>) -> Result<(), ChatError> {
        let (generation, thread_id, seq, first) = {
            let mut slot = guard(&self.slot);
            if let Some(expected) = expected.filter(|g| slot.current(*g).is_none()) {
                debug!(generation = expected, "skipping load for superseded session");
                return Ok(());
            }
            let Some(session) = slot.session.as_mut() else {
                debug!("load requested without a chat session");
                return Err(ChatError::NoActiveSession);
            };
            let Some(thread_id) = session.thread_id.clone() else {
                debug!(entry = %session.entry, "load requested before thread resolved");
                return Err(ChatError::NoThread);
            };
            session.next_load_seq += 1;
            let first = !session.loaded_once;
            session.loaded_once = true;
            (session.generation, thread_id, session.next_load_seq, first)
        };

        if first {
            self.surface.set_message_html(LOADING_HTML);
        }

        let result = self.backend.fetch_messages(&thread_id).await;

        let accepted = {
            let mut slot = guard(&self.slot);
            match slot.current(generation) {
                Some(session) if seq > session.applied_load_seq => {
                    session.applied_load_seq = seq;
                    true
                }
                _ => false,
            }
        };
        if !accepted {
            debug!(thread_id = %thread_id, generation, seq, "discarding stale message load");
            return Ok(());
        }

        match result {
            Ok(messages) => {
                debug!(thread_id = %thread_id, count = messages.len(), "messages loaded");
                self.surface.set_message_html(&render_thread(&messages, self.user_id));
                self.surface.scroll_to_bottom();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), thread_id = %thread_id, "message load failed");
                self.surface.set_message_html(LOAD_FAILED_HTML);
                Err(e)
            }
        }
    }

    /// Mark the open entry's messages read. Failures are logged only.
    pub async fn mark_messages_read(&self) {
        let Some(entry) = self.active_entry() else {
            return;
        };
        if let Err(e) = self.backend.mark_messages_read(&entry).await {
            warn!(error = %e, code = e.error_code(), entry = %entry, "mark messages read failed");
        }
    }

    /// One in-thread poll: reload and mark read only when the backend reports
    /// new messages.
    ///
    /// # Errors
    ///
    /// Returns the backend error from the check or the reload.
    pub async fn poll_tick(&self) -> Result<PollOutcome, ChatError> {
        if !self.surface.is_modal_visible() {
            return Ok(PollOutcome::Skipped);
        }
        let Some((generation, entry)) = guard(&self.slot)
            .session
            .as_ref()
            .filter(|s| s.thread_id.is_some())
            .map(|s| (s.generation, s.entry.clone()))
        else {
            return Ok(PollOutcome::Skipped);
        };

        let check = self.backend.check_new_messages(&entry).await?;
        if !self.is_current(generation) {
            return Ok(PollOutcome::Skipped);
        }
        if !check.new_messages_exist {
            return Ok(PollOutcome::Unchanged);
        }

        self.load_messages().await?;
        self.mark_messages_read().await;
        Ok(PollOutcome::Refreshed)
    }

    // =========================================================================
    // COMPOSE
    // =========================================================================

    pub fn set_draft(&self, body: &str) {
        guard(&self.composer).set_body(body);
    }

    /// Reply to `message_id`; the compose preview shows `text` in full.
    pub fn reply_to(&self, message_id: i64, text: &str) {
        guard(&self.composer).reply_to(message_id, text);
        self.surface.set_reply_preview(Some(text));
    }

    pub fn cancel_reply(&self) {
        guard(&self.composer).cancel_reply();
        self.surface.set_reply_preview(None);
    }

    /// Stage a picked file, replacing any staged file or voice message.
    pub fn stage_file(&self, file_name: &str, mime_type: &str, bytes: Vec<u8>) {
        let replaced = guard(&self.composer).stage(StagedAttachment::picked(file_name, mime_type, bytes));
        if let Some(old) = replaced {
            debug!(replaced = %old.file_name, staged = %file_name, "attachment replaced");
        }
        self.surface.set_attachment_preview(Some(file_name));
    }

    pub fn remove_attachment(&self, file_name: &str) {
        if guard(&self.composer).remove_attachment(file_name).is_some() {
            self.surface.set_attachment_preview(None);
        }
    }

    /// Start capturing a voice message. No-op while already recording.
    pub fn start_recording(self: &Arc<Self>) {
        let mut recording = guard(&self.recording);
        if recording.is_some() {
            return;
        }
        let recorder = VoiceRecorder::new();
        let clock = recorder.clock();
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = ScheduledTask::every("voice-recording-clock", RECORDING_CLOCK_PERIOD, move || {
            let weak = weak.clone();
            async move {
                let Some(controller) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let clock = guard(&controller.recording).as_mut().map(|r| r.recorder.tick());
                match clock {
                    Some(clock) => {
                        controller.surface.set_recording_clock(Some(&clock));
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(()),
                }
            }
        });
        *recording = Some(Recording { recorder, _clock: task });
        drop(recording);
        self.surface.set_recording_clock(Some(&clock));
        info!("voice recording started");
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        guard(&self.recording).is_some()
    }

    pub fn push_recording_chunk(&self, chunk: Vec<u8>) {
        if let Some(recording) = guard(&self.recording).as_mut() {
            recording.recorder.push_chunk(chunk);
        }
    }

    /// Stop recording and stage the voice message in the attachment slot.
    /// Returns `false` when nothing was being recorded.
    pub fn stop_recording(&self) -> bool {
        let Some(recording) = guard(&self.recording).take() else {
            return false;
        };
        let attachment = recording.recorder.finish();
        let size = attachment.bytes.len();
        let replaced = guard(&self.composer).stage(attachment);
        if let Some(old) = replaced {
            debug!(replaced = %old.file_name, "attachment replaced by voice message");
        }
        self.surface.set_recording_clock(None);
        self.surface.set_attachment_preview(Some(VOICE_FILE_NAME));
        info!(bytes = size, "voice recording staged");
        true
    }

    fn discard_recording(&self) {
        if guard(&self.recording).take().is_some() {
            self.surface.set_recording_clock(None);
            debug!("voice recording discarded");
        }
    }

    /// Send the compose form to the open thread.
    ///
    /// On success the form is cleared and the thread reloaded once. On failure
    /// the form is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveSession`], [`ChatError::EmptyMessage`], or
    /// the backend error.
    pub async fn send_message(&self) -> Result<(), ChatError> {
        let Some(entry) = self.active_entry() else {
            return Err(ChatError::NoActiveSession);
        };
        let outgoing = guard(&self.composer).outgoing()?;

        if let Err(e) = self.backend.send_message(&entry, &outgoing).await {
            warn!(error = %e, code = e.error_code(), entry = %entry, "send message failed");
            self.surface.show_error(SEND_FAILED_MESSAGE);
            return Err(e);
        }

        guard(&self.composer).reset();
        self.surface.reset_compose_form();
        self.surface.set_reply_preview(None);
        self.surface.set_attachment_preview(None);
        info!(
            entry = %entry,
            has_file = outgoing.attachment.is_some(),
            is_reply = outgoing.parent_message_id.is_some(),
            "message sent"
        );

        if let Err(e) = self.load_messages().await {
            debug!(error = %e, "reload after send failed");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
