//! The contact-notifier gateway seam.
//!
//! Delivery mechanics (WhatsApp, SMS, push) live behind this trait in an
//! external gateway. Failures here are `NotificationDeliveryFailure`s:
//! logged by the caller, never propagated as the primary operation's error.

use std::future::Future;

use thiserror::Error;

use crate::user::EmergencyContact;

#[derive(Debug, Error)]
#[error("contact notification failed: {0}")]
pub struct NotifyError(pub String);

/// Out-of-band message dispatch to a single emergency contact.
pub trait ContactNotifier: Send + Sync {
  fn notify(
    &self,
    contact: EmergencyContact,
    message: String,
  ) -> impl Future<Output = Result<(), NotifyError>> + Send + '_;
}
