//! Mock collaborators for testing
//!
//! In-memory storage and settings, a scripted input box, a recording
//! certificate prompt and a kernel-spec client with canned answers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use hublink_connect::{
    CertificatePrompt, InputProvider, InputRequest, KernelSpecClient, KernelSpecs,
    ServerConnectSettings,
};
use hublink_core::{
    CertificateProblem, Credentials, HubError, HubResult, RepoResult, ServerRecord,
    ServerStorage, SettingsRepository,
};

// ============================================================================
// MockServerStorage
// ============================================================================

#[derive(Default)]
pub struct MockServerStorage {
    servers: Mutex<Vec<ServerRecord>>,
    credentials: Mutex<HashMap<String, Credentials>>,
    fail_removals: Mutex<bool>,
    writes: AtomicUsize,
}

impl MockServerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, server: ServerRecord, credentials: Credentials) -> Self {
        self.credentials
            .lock()
            .insert(server.id.clone(), credentials);
        self.servers.lock().push(server);
        self
    }

    /// Make `remove_server` fail from now on
    pub fn fail_removals(&self) {
        *self.fail_removals.lock() = true;
    }

    /// Calls to `add_server_or_update` so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn credentials_for(&self, server_id: &str) -> Option<Credentials> {
        self.credentials.lock().get(server_id).cloned()
    }
}

#[async_trait]
impl ServerStorage for MockServerStorage {
    async fn all(&self) -> RepoResult<Vec<ServerRecord>> {
        Ok(self.servers.lock().clone())
    }

    async fn get_credentials(&self, server_id: &str) -> RepoResult<Option<Credentials>> {
        Ok(self.credentials.lock().get(server_id).cloned())
    }

    async fn add_server_or_update(
        &self,
        server: &ServerRecord,
        credentials: &Credentials,
    ) -> RepoResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut servers = self.servers.lock();
        match servers.iter_mut().find(|s| s.id == server.id) {
            Some(existing) => *existing = server.clone(),
            None => servers.push(server.clone()),
        }
        self.credentials
            .lock()
            .insert(server.id.clone(), credentials.clone());
        Ok(())
    }

    async fn remove_server(&self, server_id: &str) -> RepoResult<()> {
        if *self.fail_removals.lock() {
            anyhow::bail!("storage is read-only");
        }
        self.servers.lock().retain(|s| s.id != server_id);
        self.credentials.lock().remove(server_id);
        Ok(())
    }
}

// ============================================================================
// MockSettingsRepository
// ============================================================================

#[derive(Default)]
pub struct MockSettingsRepository {
    values: Mutex<HashMap<String, String>>,
}

impl MockSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

#[async_trait]
impl SettingsRepository for MockSettingsRepository {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> RepoResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// ScriptedInput
// ============================================================================

/// What the scripted user does at one input box
#[derive(Debug, Clone)]
pub enum Answer {
    Type(String),
    Back,
    Dismiss,
    /// Leave the box open forever, ignoring the cancellation token
    Hang,
}

/// Input provider answering from a script, recording every box shown.
///
/// Once the script runs out the box is dismissed.
#[derive(Default)]
pub struct ScriptedInput {
    answers: Mutex<VecDeque<Answer>>,
    requests: Mutex<Vec<InputRequest>>,
}

impl ScriptedInput {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a script that only types values
    pub fn typing(values: &[&str]) -> Self {
        Self::new(values.iter().map(|v| Answer::Type(v.to_string())))
    }

    pub fn requests(&self) -> Vec<InputRequest> {
        self.requests.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.title.clone()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().len()
    }
}

#[async_trait]
impl InputProvider for ScriptedInput {
    async fn get_value(
        &self,
        request: InputRequest,
        _cancel: &CancellationToken,
    ) -> HubResult<Option<String>> {
        self.requests.lock().push(request);
        let answer = self.answers.lock().pop_front();
        match answer {
            Some(Answer::Type(value)) => Ok(Some(value)),
            Some(Answer::Back) => Ok(None),
            Some(Answer::Hang) => std::future::pending().await,
            Some(Answer::Dismiss) | None => Err(HubError::Cancelled),
        }
    }
}

// ============================================================================
// RecordingCertificatePrompt
// ============================================================================

pub struct RecordingCertificatePrompt {
    allow: bool,
    calls: Mutex<Vec<(CertificateProblem, String)>>,
}

impl RecordingCertificatePrompt {
    pub fn allowing() -> Self {
        Self {
            allow: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn denying() -> Self {
        Self {
            allow: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(CertificateProblem, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CertificatePrompt for RecordingCertificatePrompt {
    async fn allow_insecure(&self, problem: CertificateProblem, message: &str) -> bool {
        self.calls.lock().push((problem, message.to_string()));
        self.allow
    }
}

// ============================================================================
// FakeKernelSpecs
// ============================================================================

/// Scripted outcome of one kernel-spec enumeration
#[derive(Debug, Clone)]
pub enum SpecsOutcome {
    Available,
    Unavailable,
    Fail(HubError),
    /// Cancel the given token, then report a self-signed certificate
    CancelDuringRequest(CancellationToken),
}

/// Kernel-spec client replaying outcomes; the last one repeats.
pub struct FakeKernelSpecs {
    outcomes: Mutex<VecDeque<SpecsOutcome>>,
    seen: Mutex<Vec<ServerConnectSettings>>,
}

impl FakeKernelSpecs {
    pub fn new(outcomes: impl IntoIterator<Item = SpecsOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn available() -> Self {
        Self::new([SpecsOutcome::Available])
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn seen(&self) -> Vec<ServerConnectSettings> {
        self.seen.lock().clone()
    }

    fn next(&self) -> SpecsOutcome {
        let mut outcomes = self.outcomes.lock();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap_or(SpecsOutcome::Unavailable)
        } else {
            outcomes.front().cloned().unwrap_or(SpecsOutcome::Unavailable)
        }
    }
}

#[async_trait]
impl KernelSpecClient for FakeKernelSpecs {
    async fn get_kernel_specs(
        &self,
        settings: &ServerConnectSettings,
        _cancel: &CancellationToken,
    ) -> HubResult<Option<KernelSpecs>> {
        self.seen.lock().push(settings.clone());
        match self.next() {
            SpecsOutcome::Available => Ok(Some(python_kernel_specs())),
            SpecsOutcome::Unavailable => Ok(None),
            SpecsOutcome::Fail(e) => Err(e),
            SpecsOutcome::CancelDuringRequest(token) => {
                token.cancel();
                Err(HubError::SelfSignedCertificate(
                    "self signed certificate in certificate chain".into(),
                ))
            }
        }
    }
}

pub fn python_kernel_specs() -> KernelSpecs {
    KernelSpecs {
        default: Some("python3".into()),
        kernelspecs: HashMap::from([(
            "python3".to_string(),
            serde_json::json!({ "name": "python3", "spec": { "language": "python" } }),
        )]),
    }
}
