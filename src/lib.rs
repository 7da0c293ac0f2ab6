//! Watches web pages and relays their changes to chat webhooks.
//!
//! Every configured page runs its own fetch → format → transport loop; see
//! [`client::Client`] for how pages are wired to their submodules.

pub mod client;
pub mod config;
pub mod fetcher;
pub mod format;
pub mod notification;
pub mod page;
pub mod store;
pub mod transport;
pub mod webhook_log;
