//! Telegram integration -- deliver deadline alerts via the Bot API.
//!
//! The sink renders a `DeadlineAlert` into a Markdown message and posts it
//! to `sendMessage` on the configured channel. Requests carry a 10 second
//! timeout; a timed-out send is a delivery failure and the scheduler
//! re-attempts the same threshold on its next cycle.

use chrono::FixedOffset;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::error::DeliveryError;
use crate::notify::{DeadlineAlert, NotificationSink};
use crate::storage::{FrontendSection, TelegramSection};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification sink backed by a Telegram bot.
#[derive(Debug)]
pub struct TelegramSink {
    token: String,
    chat_id: String,
    display_offset: FixedOffset,
    api_base: String,
    client: Client,
}

impl TelegramSink {
    /// Build a sink from configuration.
    ///
    /// # Errors
    /// Returns `NotConfigured` when the token or chat id is missing, and a
    /// request error if the HTTP client cannot be constructed.
    pub fn from_config(
        telegram: &TelegramSection,
        frontend: &FrontendSection,
    ) -> Result<Self, DeliveryError> {
        if telegram.token.is_empty() {
            return Err(DeliveryError::NotConfigured(
                "telegram token is empty (set [telegram].token or TELEGRAM_TOKEN)".to_string(),
            ));
        }
        if telegram.chat_id.is_empty() {
            return Err(DeliveryError::NotConfigured(
                "telegram chat id is empty (set [telegram].chat_id or TELEGRAM_CHAT_ID)"
                    .to_string(),
            ));
        }

        // FixedOffset accepts up to +/-24h; clamp so a bad config value
        // degrades to UTC display instead of failing startup.
        let display_offset = FixedOffset::east_opt(
            frontend.utc_offset_minutes.clamp(-23 * 60, 23 * 60) * 60,
        )
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero UTC offset is valid"));

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            token: telegram.token.clone(),
            chat_id: telegram.chat_id.clone(),
            display_offset,
            api_base: DEFAULT_API_BASE.to_string(),
            client,
        })
    }

    /// Override the Bot API base URL. Tests point this at a mock server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Render an alert into the message text sent to the channel.
    pub fn render(&self, alert: &DeadlineAlert) -> String {
        let headline = if alert.is_overdue() {
            format!(
                "🚨 *{}* is overdue by {:.0}h",
                alert.title,
                alert.hours_left.abs().ceil()
            )
        } else {
            format!(
                "⏰ *{}* is due in {:.0}h",
                alert.title,
                alert.hours_left.ceil()
            )
        };

        let mut lines = vec![headline];
        lines.push(format!("Status: {}", alert.status.label()));
        if let Some(assignee) = &alert.assignee {
            lines.push(format!("Assignee: {assignee}"));
        }
        if let Some(priority) = alert.priority {
            lines.push(format!("Priority: {priority}"));
        }
        lines.push(format!(
            "Deadline: {}",
            alert
                .deadline
                .with_timezone(&self.display_offset)
                .format("%Y-%m-%d %H:%M %:z")
        ));
        lines.push(format!("Open: {}", alert.url));
        lines.join("\n")
    }

    /// Post a message to the configured chat.
    fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        let resp = tokio::runtime::Handle::current()
            .block_on(self.client.post(&url).json(&body).send())?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = tokio::runtime::Handle::current()
                .block_on(resp.text())
                .unwrap_or_default();
            Err(DeliveryError::Rejected { status, body })
        }
    }

    /// Send a startup/test message to verify the channel works.
    pub fn send_test_message(&self) -> Result<(), DeliveryError> {
        self.post_message(
            "✅ *Kanbancal bot activated!*\nReady to send deadline notifications.",
        )
    }
}

impl NotificationSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn deliver(&self, alert: &DeadlineAlert) -> Result<(), DeliveryError> {
        let text = self.render(alert);
        self.post_message(&text)
    }
}
