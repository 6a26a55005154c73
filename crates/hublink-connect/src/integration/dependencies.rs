//! Collaborators the integration is wired from
//!
//! Everything outside the connection core (storage, settings, UI, event
//! bus, transport) is injected here so hosts and tests can swap it.

use std::sync::Arc;

use crate::capture::InputProvider;
use crate::config::ConnectConfig;
use crate::http::{ReqwestFetch, SharedFetch};
use crate::validator::{CertificatePrompt, DenyInsecure};
use hublink_core::{EventSender, HubResult, HubSettingsService, ServerStorage};

#[derive(Clone)]
pub struct IntegrationDependencies {
    pub fetch: SharedFetch,
    pub storage: Arc<dyn ServerStorage>,
    pub settings: Arc<HubSettingsService>,
    pub input: Arc<dyn InputProvider>,
    pub prompt: Arc<dyn CertificatePrompt>,
    pub events: EventSender,
}

impl IntegrationDependencies {
    pub fn new(
        fetch: SharedFetch,
        storage: Arc<dyn ServerStorage>,
        settings: Arc<HubSettingsService>,
        input: Arc<dyn InputProvider>,
        events: EventSender,
    ) -> Self {
        Self {
            fetch,
            storage,
            settings,
            input,
            prompt: Arc::new(DenyInsecure),
            events,
        }
    }

    /// Same, with the production reqwest transport reading `settings`
    pub fn with_reqwest(
        config: &ConnectConfig,
        storage: Arc<dyn ServerStorage>,
        settings: Arc<HubSettingsService>,
        input: Arc<dyn InputProvider>,
        events: EventSender,
    ) -> HubResult<Self> {
        let fetch: SharedFetch = Arc::new(ReqwestFetch::new(config, settings.clone())?);
        Ok(Self::new(fetch, storage, settings, input, events))
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CertificatePrompt>) -> Self {
        self.prompt = prompt;
        self
    }
}
