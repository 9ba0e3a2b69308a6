//! Telegram Bot API: delivery, subscription commands and the update loop.
//!
//! - [`TelegramClient`] speaks the Bot API over HTTPS and implements both
//!   [`ChatTransport`](crate::transport::ChatTransport) and [`UpdateFeed`]
//! - [`CommandHandler`] turns `/start`, `/stop` and `/status` into store
//!   operations and replies
//! - [`TelegramBot`] long-polls for updates and runs the handler until
//!   cancelled

mod bot;
mod client;
mod commands;
pub mod types;

pub use bot::{TelegramBot, DEFAULT_POLL_TIMEOUT, DEFAULT_RETRY_PAUSE};
pub use client::{TelegramClient, UpdateFeed, DEFAULT_API_URL};
pub use commands::{parse_tags, Command, CommandHandler, Reply, PERMISSION_DENIED};
