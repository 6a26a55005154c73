//! Where the credential master key lives
//!
//! The OS keychain (Credential Manager, macOS Keychain, Secret Service) in
//! production; process memory for tests and hosts that bring their own key.

use anyhow::{bail, Context, Result};
use keyring::Entry;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{generate_master_key, KEY_SIZE};

/// Keychain service the master key is filed under.
pub const KEYCHAIN_SERVICE: &str = "com.hublink.storage";

const MASTER_KEY_ACCOUNT: &str = "hub-credentials-key";

/// Key material that wipes itself on drop
pub type MasterKey = Zeroizing<[u8; KEY_SIZE]>;

/// Source of the key that seals credential columns.
pub trait MasterKeyProvider: Send + Sync {
    /// The key, minted and remembered on first use.
    fn master_key(&self) -> Result<MasterKey>;

    /// Drop the remembered key. Data sealed with it becomes unreadable.
    fn forget(&self) -> Result<()>;
}

pub struct KeychainKeyProvider {
    entry: Entry,
}

impl KeychainKeyProvider {
    pub fn new() -> Result<Self> {
        Self::for_account(KEYCHAIN_SERVICE, MASTER_KEY_ACCOUNT)
    }

    /// Separate service/account, e.g. one key per profile.
    pub fn for_account(service: &str, account: &str) -> Result<Self> {
        let entry = Entry::new(service, account)
            .with_context(|| format!("Cannot open keychain entry {}/{}", service, account))?;
        Ok(Self { entry })
    }

    fn load(&self) -> Result<Option<MasterKey>> {
        match self.entry.get_password() {
            Ok(encoded) => parse_key(&Zeroizing::new(encoded)).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!("[Keychain] Lookup failed: {}", e);
                Err(e).context("Keychain unavailable")
            }
        }
    }

    fn store(&self, key: &MasterKey) -> Result<()> {
        let encoded = Zeroizing::new(hex::encode(**key));
        self.entry
            .set_password(&encoded)
            .context("Cannot save master key to keychain")
    }
}

fn parse_key(encoded: &str) -> Result<MasterKey> {
    let raw = Zeroizing::new(hex::decode(encoded.trim()).context("Master key is not hex")?);
    if raw.len() != KEY_SIZE {
        bail!("Master key has {} bytes, wanted {}", raw.len(), KEY_SIZE);
    }
    let mut key = MasterKey::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&raw);
    Ok(key)
}

impl MasterKeyProvider for KeychainKeyProvider {
    fn master_key(&self) -> Result<MasterKey> {
        if let Some(key) = self.load()? {
            debug!("[Keychain] Using stored master key");
            return Ok(key);
        }
        info!("[Keychain] Minting master key for hub credentials");
        let key = MasterKey::new(generate_master_key()?);
        self.store(&key)?;
        Ok(key)
    }

    fn forget(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Cannot remove master key from keychain"),
        }
    }
}

/// Key held in process memory; for hosts that manage the key themselves.
#[derive(Default)]
pub struct MemoryKeyProvider {
    slot: Mutex<Option<[u8; KEY_SIZE]>>,
}

impl MemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            slot: Mutex::new(Some(key)),
        }
    }
}

impl MasterKeyProvider for MemoryKeyProvider {
    fn master_key(&self) -> Result<MasterKey> {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(generate_master_key()?);
        }
        match *slot {
            Some(key) => Ok(MasterKey::new(key)),
            None => bail!("Master key slot is empty"),
        }
    }

    fn forget(&self) -> Result<()> {
        self.slot.lock().take();
        Ok(())
    }
}
