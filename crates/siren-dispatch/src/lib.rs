//! Dispatch coordination engine for Siren.
//!
//! Two halves: the real-time notification bus (per-connection private
//! channels plus topic broadcast) and the [`Dispatcher`] state machine that
//! drives request lifecycle, offer fan-out, first-claim-wins assignment,
//! and contact alerts.

pub mod bus;
pub mod connections;
pub mod coordinator;

pub use bus::{ServerEvent, StatusBroadcast, Topic, TopicEvent};
pub use connections::ConnectionManager;
pub use coordinator::{DispatchStore, Dispatcher};
