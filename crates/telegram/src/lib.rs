//! Telegram channel adapter: long polling in, `sendMessage` out.

mod adapter;

pub use adapter::TelegramAdapter;
