//! Compose form state: draft text, reply target, and the single attachment
//! slot shared by the file picker and the voice recorder.

use crate::error::ChatError;
use crate::surface::RecordingClock;

pub const VOICE_FILE_NAME: &str = "voice-message.mp3";
pub const VOICE_MIME_TYPE: &str = "audio/mp3";
/// Recording progress reaches 100% at five minutes.
pub const MAX_RECORDING_SECS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSource {
    FilePicker,
    VoiceRecording,
}

/// A file waiting to be sent with the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub source: AttachmentSource,
}

impl StagedAttachment {
    pub fn picked(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
            source: AttachmentSource::FilePicker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub message_id: i64,
    pub preview: String,
}

/// The payload of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    pub parent_message_id: Option<i64>,
    pub attachment: Option<StagedAttachment>,
}

#[derive(Debug, Clone, Default)]
pub struct Composer {
    body: String,
    reply_to: Option<ReplyTarget>,
    attachment: Option<StagedAttachment>,
}

impl Composer {
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn reply_target(&self) -> Option<&ReplyTarget> {
        self.reply_to.as_ref()
    }

    #[must_use]
    pub fn attachment(&self) -> Option<&StagedAttachment> {
        self.attachment.as_ref()
    }

    pub fn reply_to(&mut self, message_id: i64, preview: impl Into<String>) {
        self.reply_to = Some(ReplyTarget { message_id, preview: preview.into() });
    }

    pub fn cancel_reply(&mut self) -> Option<ReplyTarget> {
        self.reply_to.take()
    }

    /// Stage `attachment`, returning whatever it replaced. Only one
    /// attachment travels with a message.
    pub fn stage(&mut self, attachment: StagedAttachment) -> Option<StagedAttachment> {
        self.attachment.replace(attachment)
    }

    /// Unstage the attachment if it carries `file_name`.
    pub fn remove_attachment(&mut self, file_name: &str) -> Option<StagedAttachment> {
        if self.attachment.as_ref().is_some_and(|a| a.file_name == file_name) {
            self.attachment.take()
        } else {
            None
        }
    }

    /// Snapshot the form as an outgoing message.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyMessage`] when the body is blank and nothing
    /// is attached.
    pub fn outgoing(&self) -> Result<OutgoingMessage, ChatError> {
        if self.body.trim().is_empty() && self.attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(OutgoingMessage {
            body: self.body.clone(),
            parent_message_id: self.reply_to.as_ref().map(|r| r.message_id),
            attachment: self.attachment.clone(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// VOICE RECORDING
// =============================================================================

/// Accumulates captured audio chunks until the recording is stopped.
#[derive(Debug, Default)]
pub struct VoiceRecorder {
    chunks: Vec<Vec<u8>>,
    elapsed_secs: u32,
}

impl VoiceRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// Advance the clock by one second.
    pub fn tick(&mut self) -> RecordingClock {
        self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        self.clock()
    }

    #[must_use]
    pub fn clock(&self) -> RecordingClock {
        recording_clock(self.elapsed_secs)
    }

    /// Package the captured audio as a voice-message file.
    #[must_use]
    pub fn finish(self) -> StagedAttachment {
        StagedAttachment {
            file_name: VOICE_FILE_NAME.to_owned(),
            mime_type: VOICE_MIME_TYPE.to_owned(),
            bytes: self.chunks.concat(),
            source: AttachmentSource::VoiceRecording,
        }
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recording_clock(elapsed_secs: u32) -> RecordingClock {
    let label = format!("{:02}:{:02}", elapsed_secs / 60, elapsed_secs % 60);
    let progress_percent = (elapsed_secs as f32 / MAX_RECORDING_SECS as f32 * 100.0).min(100.0);
    RecordingClock { label, progress_percent }
}

#[cfg(test)]
#[path = "compose_test.rs"]
mod tests;
