//! Interactive input contract used by the capture workflow

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hublink_core::HubResult;

/// One input box shown to the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRequest {
    pub title: String,
    pub placeholder: String,
    /// Pre-filled value
    pub value: String,
    /// Shown under the box; empty for none
    pub validation_message: String,
    /// Mask the typed value
    pub password: bool,
}

impl InputRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn validation_message(mut self, message: impl Into<String>) -> Self {
        self.validation_message = message.into();
        self
    }

    pub fn password(mut self) -> Self {
        self.password = true;
        self
    }
}

/// Host UI for text input.
///
/// `Ok(None)` means the user pressed the back button. Dismissing the box
/// is `Err(HubError::Cancelled)`.
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn get_value(
        &self,
        request: InputRequest,
        cancel: &CancellationToken,
    ) -> HubResult<Option<String>>;
}
