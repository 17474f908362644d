//! # portal-chat
//!
//! Chat sync client for the customer portal. Resolves a chat thread for a
//! business entry (module + reference id), renders its messages, keeps the
//! open thread fresh through polling, sends messages with an optional file or
//! voice attachment, and aggregates unread badges and topbar notifications.
//!
//! DESIGN
//! ======
//! The crate never touches a DOM. Hosts implement the small surface traits in
//! [`surface`] and feed page events (modal hidden, tab visible, window focus,
//! notification clicks) into a [`portal::ChatPortal`]. All server traffic goes
//! through the [`api::ChatBackend`] trait so the lifecycle logic can be driven
//! by an in-memory backend in tests.
//!
//! Module order, leaves first: `page`/`types` → `api` → `compose`/`render` →
//! `schedule` → `badges` → `session` → `notify` → `portal`.

pub mod api;
pub mod badges;
pub mod compose;
pub mod config;
pub mod error;
pub mod notify;
pub mod page;
pub mod portal;
pub mod render;
pub mod schedule;
pub mod session;
pub mod surface;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::ChatConfig;
pub use error::ChatError;
pub use portal::ChatPortal;
pub use session::{ChatController, ChatStatus, PollOutcome};
