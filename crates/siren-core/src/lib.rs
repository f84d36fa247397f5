//! Core types and trait definitions for the Siren dispatch engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod error;
pub mod geo;
pub mod notify;
pub mod request;
pub mod responder;
pub mod store;
pub mod user;

pub use error::{Error, Result};
