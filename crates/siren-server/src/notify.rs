//! Contact-notifier gateway implementations.

use siren_core::{
  notify::{ContactNotifier, NotifyError},
  user::EmergencyContact,
};

/// Stand-in delivery gateway that writes each alert to the log. Swap in an
/// SMS/WhatsApp gateway by implementing [`ContactNotifier`] against its
/// HTTP API and passing it to the dispatcher instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl ContactNotifier for LogNotifier {
  async fn notify(
    &self,
    contact: EmergencyContact,
    message: String,
  ) -> Result<(), NotifyError> {
    tracing::info!(to = %contact.phone, contact = %contact.name, %message, "contact alert");
    Ok(())
  }
}
