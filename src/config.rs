//! Chat client configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_THREAD_POLL_MS: u64 = 5_000;
pub const DEFAULT_GLOBAL_POLL_MS: u64 = 15_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BADGE_CAP: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Backend origin, without a trailing slash.
    pub base_url: String,
    /// Cadence of the open-thread "anything new?" check.
    pub thread_poll_interval: Duration,
    /// Cadence of the page-wide badge and notification refresh.
    pub global_poll_interval: Duration,
    pub timeouts: HttpTimeouts,
    /// Unread counts above this render as `"{cap}+"`.
    pub badge_cap: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            thread_poll_interval: Duration::from_millis(DEFAULT_THREAD_POLL_MS),
            global_poll_interval: Duration::from_millis(DEFAULT_GLOBAL_POLL_MS),
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            badge_cap: DEFAULT_BADGE_CAP,
        }
    }
}

impl ChatConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `CHAT_BASE_URL`: default `http://127.0.0.1:5000`
    /// - `CHAT_THREAD_POLL_MS`: default 5000
    /// - `CHAT_GLOBAL_POLL_MS`: default 15000
    /// - `CHAT_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CHAT_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CHAT_BADGE_CAP`: default 9
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unparseable or zero values
    /// fall back to their defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("CHAT_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
            .trim()
            .trim_end_matches('/')
            .to_owned();

        let thread_poll_ms = parse_nonzero(&lookup, "CHAT_THREAD_POLL_MS", DEFAULT_THREAD_POLL_MS);
        let global_poll_ms = parse_nonzero(&lookup, "CHAT_GLOBAL_POLL_MS", DEFAULT_GLOBAL_POLL_MS);
        let timeouts = HttpTimeouts {
            request_secs: parse_nonzero(&lookup, "CHAT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_nonzero(&lookup, "CHAT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let badge_cap = lookup("CHAT_BADGE_CAP")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_BADGE_CAP);

        Self {
            base_url,
            thread_poll_interval: Duration::from_millis(thread_poll_ms),
            global_poll_interval: Duration::from_millis(global_poll_ms),
            timeouts,
            badge_cap,
        }
    }
}

fn parse_nonzero<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
