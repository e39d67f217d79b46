//! External service integrations.

pub mod telegram;

pub use telegram::TelegramSink;
