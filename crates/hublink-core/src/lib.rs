//! # Hublink Core Library
//!
//! Domain types and contracts shared by the hub connection crates.
//!
//! ## Modules
//!
//! - `domain` - Server records, credentials, tokens and hub events
//! - `error` - The `HubError` taxonomy
//! - `repository` - Storage traits
//! - `service` - Typed settings access
//! - `event_bus` - Broadcast distribution of hub events

pub mod domain;
pub mod error;
pub mod event_bus;
pub mod repository;
pub mod service;

pub use domain::*;
pub use error::{CertificateProblem, HubError, HubResult};
pub use repository::*;
pub use service::*;

pub use event_bus::{EventBus, EventReceiver, EventSender};
