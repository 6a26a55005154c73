//! Hub events
//!
//! Facts published on the event bus by the connection layer. The host binds
//! `ServersChanged` to its server-list refresh; everything else is a
//! telemetry-style notification that consumers may ignore.

use serde::{Deserialize, Serialize};

use crate::error::CertificateProblem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// The set of servers (or their labels) changed
    ServersChanged,

    /// The capture workflow committed a new or updated server
    ServerAdded {
        server_id: String,
        display_name: String,
        auth_kind: crate::AuthProviderKind,
    },

    /// A server was removed from storage
    ServerRemoved { server_id: String },

    /// The user answered a certificate prompt
    CertificateProblemSolved {
        problem: CertificateProblem,
        allowed: bool,
    },
}

impl HubEvent {
    /// Stable name used in logs
    pub fn type_name(&self) -> &'static str {
        match self {
            HubEvent::ServersChanged => "servers_changed",
            HubEvent::ServerAdded { .. } => "server_added",
            HubEvent::ServerRemoved { .. } => "server_removed",
            HubEvent::CertificateProblemSolved { .. } => "certificate_problem_solved",
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            HubEvent::ServerAdded { server_id, .. } | HubEvent::ServerRemoved { server_id } => {
                Some(server_id)
            }
            _ => None,
        }
    }
}
