//! Requester profile and emergency contacts.
//!
//! Account management lives in an external identity provider; the
//! coordinator only consumes the contact list to fan out alerts, so the
//! profile here is the minimal projection it needs.

use serde::{Deserialize, Serialize};

/// A person to alert out-of-band when the requester's status changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
  pub name:  String,
  pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
  /// Identity-provider id; opaque to the dispatch engine.
  pub user_id:  String,
  pub name:     String,
  pub contacts: Vec<EmergencyContact>,
}
