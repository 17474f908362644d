//! Host page context: who is logged in and which entry a chat belongs to.
//!
//! The portal page exposes the current user through `<meta>` tags
//! (`user-id`, `user-name`, `csrf-token`). Hosts hand those pairs over once
//! at page load; everything downstream reads the typed [`PageContext`].

use std::fmt;

use tracing::warn;

/// Identity and request token taken from the host page's meta tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub csrf_token: Option<String>,
}

impl PageContext {
    /// Build a context from `(name, content)` meta tag pairs.
    ///
    /// Unknown tags are ignored. A missing or non-numeric `user-id` leaves the
    /// user anonymous, which makes every rendered message a received one.
    pub fn from_meta<'a, I>(tags: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ctx = Self::default();
        for (name, content) in tags {
            let content = content.trim();
            match name {
                "user-id" => ctx.user_id = content.parse::<i64>().ok(),
                "user-name" if !content.is_empty() => ctx.user_name = Some(content.to_owned()),
                "csrf-token" if !content.is_empty() => ctx.csrf_token = Some(content.to_owned()),
                _ => {}
            }
        }
        if ctx.user_id.is_none() || ctx.user_name.is_none() {
            warn!("user meta tags not found; chat functionality may be limited");
        }
        ctx
    }
}

/// A business entry a chat thread hangs off, e.g. `("shipment", "42")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef {
    pub module: String,
    pub entry_id: String,
}

impl EntryRef {
    pub fn new(module: impl Into<String>, entry_id: impl Into<String>) -> Self {
        Self { module: module.into(), entry_id: entry_id.into() }
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.entry_id)
    }
}

#[cfg(test)]
#[path = "page_test.rs"]
mod tests;
