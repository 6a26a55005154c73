//! Domain types
//!
//! - Entities (ServerRecord, Credentials)
//! - Value objects (AuthProviderKind, ApiToken, ServerDescriptor)
//! - Events (HubEvent)

mod credential;
mod event;
mod server;

pub use credential::*;
pub use event::HubEvent;
pub use server::*;
