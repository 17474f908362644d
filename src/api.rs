//! Backend API client.
//!
//! SYSTEM CONTEXT
//! ==============
//! The chat backend is an external JSON/multipart HTTP API. [`ChatBackend`]
//! mirrors its endpoints one method per route so the lifecycle code can be
//! driven by an in-memory double; [`HttpBackend`] is the `reqwest`
//! implementation used in production.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become [`ChatError::Status`] with the body kept for
//! logs, undecodable bodies become [`ChatError::Decode`], and 2xx answers
//! carrying `success: false` become [`ChatError::Rejected`]. Callers decide
//! whether a failure is surfaced or only logged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::compose::OutgoingMessage;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::page::{EntryRef, PageContext};
use crate::types::{Ack, FeedEnvelope, Message, MessageList, NewMessagesCheck, NotificationFeed, ThreadInfo};

pub const CSRF_HEADER: &str = "X-CSRF-Token";

// =============================================================================
// TRAIT
// =============================================================================

/// Chat backend contract. One method per backend route.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /chat/thread/{module}/{reference}`: resolve or create the thread.
    async fn resolve_thread(&self, entry: &EntryRef) -> Result<ThreadInfo, ChatError>;

    /// `GET /chat/messages/{thread}`: the thread's messages, server-ordered.
    async fn fetch_messages(&self, thread_id: &str) -> Result<Vec<Message>, ChatError>;

    /// `GET /chat/check-new-messages/{module}/{reference}`.
    async fn check_new_messages(&self, entry: &EntryRef) -> Result<NewMessagesCheck, ChatError>;

    /// `POST /chat/mark-messages-read/{module}/{reference}`.
    async fn mark_messages_read(&self, entry: &EntryRef) -> Result<(), ChatError>;

    /// `POST /chat/message/{id}/mark-read`.
    async fn mark_message_read(&self, message_id: i64) -> Result<(), ChatError>;

    /// `POST /chat/send-message/{module}/{reference}` as multipart.
    async fn send_message(&self, entry: &EntryRef, outgoing: &OutgoingMessage) -> Result<(), ChatError>;

    /// `GET /chat/notifications/get-all`.
    async fn fetch_notifications(&self) -> Result<NotificationFeed, ChatError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
    csrf_token: Option<String>,
}

impl HttpBackend {
    /// Build a client for `config.base_url` carrying the page's CSRF token.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot take path segments or the HTTP
    /// client fails to build.
    pub fn new(config: &ChatConfig, page: &PageContext) -> Result<Self, ChatError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ChatError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ChatError::InvalidBaseUrl(config.base_url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ChatError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base, csrf_token: page.csrf_token.clone() })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ChatError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ChatError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.post(url);
        match &self.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ChatError> {
        let url = self.url(segments)?;
        debug!(%url, "chat api GET");
        let response = self.http.get(url).send().await?;
        read_json(response).await
    }

    async fn post_ack(&self, segments: &[&str], fallback: &str) -> Result<(), ChatError> {
        let url = self.url(segments)?;
        debug!(%url, "chat api POST");
        let response = self.post(url).send().await?;
        read_json::<Ack>(response).await?.into_result(fallback)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ChatError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ChatError::Status { status: status.as_u16(), body: text });
    }
    serde_json::from_str(&text).map_err(|e| ChatError::Decode(e.to_string()))
}

fn multipart_form(outgoing: &OutgoingMessage) -> Result<Form, ChatError> {
    let mut form = Form::new().text("message", outgoing.body.clone());
    if let Some(parent) = outgoing.parent_message_id {
        form = form.text("parent_message_id", parent.to_string());
    }
    if let Some(file) = &outgoing.attachment {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)?;
        form = form.part("file", part);
    }
    Ok(form)
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn resolve_thread(&self, entry: &EntryRef) -> Result<ThreadInfo, ChatError> {
        self.get_json(&["chat", "thread", &entry.module, &entry.entry_id]).await
    }

    async fn fetch_messages(&self, thread_id: &str) -> Result<Vec<Message>, ChatError> {
        let list: MessageList = self.get_json(&["chat", "messages", thread_id]).await?;
        Ok(list.messages)
    }

    async fn check_new_messages(&self, entry: &EntryRef) -> Result<NewMessagesCheck, ChatError> {
        self.get_json(&["chat", "check-new-messages", &entry.module, &entry.entry_id])
            .await
    }

    async fn mark_messages_read(&self, entry: &EntryRef) -> Result<(), ChatError> {
        self.post_ack(
            &["chat", "mark-messages-read", &entry.module, &entry.entry_id],
            "mark messages read failed",
        )
        .await
    }

    async fn mark_message_read(&self, message_id: i64) -> Result<(), ChatError> {
        let id = message_id.to_string();
        self.post_ack(&["chat", "message", &id, "mark-read"], "mark message read failed")
            .await
    }

    async fn send_message(&self, entry: &EntryRef, outgoing: &OutgoingMessage) -> Result<(), ChatError> {
        let url = self.url(&["chat", "send-message", &entry.module, &entry.entry_id])?;
        debug!(
            %url,
            body_len = outgoing.body.len(),
            has_file = outgoing.attachment.is_some(),
            "chat api send"
        );
        let response = self.post(url).multipart(multipart_form(outgoing)?).send().await?;
        read_json::<Ack>(response)
            .await?
            .into_result("Failed to send message")
    }

    async fn fetch_notifications(&self) -> Result<NotificationFeed, ChatError> {
        let envelope: FeedEnvelope = self.get_json(&["chat", "notifications", "get-all"]).await?;
        envelope.into_feed()
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
