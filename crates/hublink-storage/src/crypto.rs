//! Sealing of credential columns with AES-256-GCM.
//!
//! Each value is bound to the column and server row it was written for:
//! `"{column}:{server_id}"` is passed as associated data, so a sealed
//! password copied into another row (or into the token column) fails to
//! open instead of decrypting as someone else's secret.

use anyhow::{anyhow, bail, Context, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Size of the master key (256 bits).
pub const KEY_SIZE: usize = 32;

/// Secret columns of `server_credentials`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretColumn {
    Username,
    Password,
    Token,
    TokenId,
}

impl SecretColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretColumn::Username => "username",
            SecretColumn::Password => "password",
            SecretColumn::Token => "token",
            SecretColumn::TokenId => "token_id",
        }
    }

    fn binding(&self, server_id: &str) -> Vec<u8> {
        format!("{}:{}", self.as_str(), server_id).into_bytes()
    }
}

pub struct FieldEncryptor {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl FieldEncryptor {
    pub fn new(master_key: &[u8; KEY_SIZE]) -> Result<Self> {
        let key = UnboundKey::new(&AES_256_GCM, master_key)
            .map_err(|_| anyhow!("Master key rejected by AES-256-GCM"))?;
        Ok(Self {
            key: LessSafeKey::new(key),
            rng: SystemRandom::new(),
        })
    }

    /// `hex(nonce || ciphertext || tag)` under a fresh nonce, bound to
    /// `column` of row `server_id`.
    pub fn seal(&self, column: SecretColumn, server_id: &str, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| anyhow!("No randomness for {} nonce", column.as_str()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + plaintext.len() + AES_256_GCM.tag_len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(plaintext.as_bytes());
        let (_, body) = sealed.split_at_mut(NONCE_LEN);
        let tag = self
            .key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(column.binding(server_id)),
                body,
            )
            .map_err(|_| anyhow!("Cannot seal {}", column.as_str()))?;
        sealed.extend_from_slice(tag.as_ref());
        Ok(hex::encode(sealed))
    }

    /// Reverse of [`seal`](Self::seal). Fails for a different key, column
    /// or row, and for tampered data.
    pub fn open(&self, column: SecretColumn, server_id: &str, sealed_hex: &str) -> Result<String> {
        let sealed = hex::decode(sealed_hex)
            .with_context(|| format!("Sealed {} is not hex", column.as_str()))?;
        if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            bail!("Sealed {} is truncated", column.as_str());
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| anyhow!("Bad nonce on {}", column.as_str()))?;

        let mut body = body.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(column.binding(server_id)), &mut body)
            .map_err(|_| {
                anyhow!(
                    "Cannot open {} of server {}: wrong key or not sealed for this row",
                    column.as_str(),
                    server_id
                )
            })?;
        String::from_utf8(plaintext.to_vec())
            .with_context(|| format!("Opened {} is not UTF-8", column.as_str()))
    }

    pub fn seal_optional(
        &self,
        column: SecretColumn,
        server_id: &str,
        plaintext: Option<&str>,
    ) -> Result<Option<String>> {
        plaintext.map(|p| self.seal(column, server_id, p)).transpose()
    }

    pub fn open_optional(
        &self,
        column: SecretColumn,
        server_id: &str,
        sealed_hex: Option<&str>,
    ) -> Result<Option<String>> {
        sealed_hex.map(|s| self.open(column, server_id, s)).transpose()
    }
}

/// Fresh random master key.
pub fn generate_master_key() -> Result<[u8; KEY_SIZE]> {
    let mut key = [0u8; KEY_SIZE];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| anyhow!("No randomness for master key"))?;
    Ok(key)
}
