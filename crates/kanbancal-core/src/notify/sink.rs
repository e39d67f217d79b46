//! Notification delivery boundary.

use super::alert::DeadlineAlert;
use crate::error::DeliveryError;

/// Delivers rendered notifications to an external channel.
///
/// Delivery is synchronous from the scheduler's point of view: `deliver`
/// returns only once the outcome is known, and errors are distinguishable
/// from success so the watermark is never advanced for a message that was
/// not confirmed. Implementations must bound their own request time; a
/// hung sink call would otherwise stall the task it belongs to.
pub trait NotificationSink: Send + Sync {
    /// Short identifier for logs (e.g. "telegram").
    fn name(&self) -> &str;

    /// Render and deliver one alert.
    fn deliver(&self, alert: &DeadlineAlert) -> Result<(), DeliveryError>;
}
