//! Domain services

pub mod settings_service;

pub use settings_service::{keys, HubSettingsService};
