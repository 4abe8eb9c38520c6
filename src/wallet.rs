//! Fee-vault custody key loading
//!
//! The fee vault's owner key co-signs every transaction that moves fees. It is
//! read from a [`SecretSource`] (environment variable, file, or an in-process
//! value for tests) and accepted in two encodings:
//! - base58 of the 64-byte secret+public keypair
//! - a JSON array of 64 byte values
//!
//! A bare 32-byte seed is rejected: without the public half a typo in the
//! secret would silently produce a different, valid key.

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

const KEYPAIR_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error("Secret source unavailable: {0}")]
    Unavailable(String),

    #[error("Secret is neither base58 nor a JSON byte array")]
    Encoding,

    #[error("Invalid keypair length: expected 64 bytes, got {0}")]
    Length(usize),

    #[error("Invalid keypair: {0}")]
    Invalid(String),
}

/// Where the fee-vault secret comes from
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn load(&self) -> Result<Zeroizing<String>, KeyLoadError>;
}

/// Secret held in an environment variable
#[derive(Debug, Clone)]
pub struct EnvSecret {
    pub var: String,
}

#[async_trait]
impl SecretSource for EnvSecret {
    async fn load(&self) -> Result<Zeroizing<String>, KeyLoadError> {
        std::env::var(&self.var)
            .map(Zeroizing::new)
            .map_err(|_| KeyLoadError::Unavailable(format!("environment variable {} not set", self.var)))
    }
}

/// Secret held in a file, e.g. a `solana-keygen` JSON keypair
#[derive(Debug, Clone)]
pub struct FileSecret {
    pub path: PathBuf,
}

#[async_trait]
impl SecretSource for FileSecret {
    async fn load(&self) -> Result<Zeroizing<String>, KeyLoadError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map(Zeroizing::new)
            .map_err(|e| KeyLoadError::Unavailable(format!("{}: {e}", self.path.display())))
    }
}

/// Secret supplied in-process
pub struct StaticSecret(pub Zeroizing<String>);

#[async_trait]
impl SecretSource for StaticSecret {
    async fn load(&self) -> Result<Zeroizing<String>, KeyLoadError> {
        Ok(self.0.clone())
    }
}

/// Parse a keypair from base58 or a JSON byte array
pub fn parse_keypair(secret: &str) -> Result<Keypair, KeyLoadError> {
    let trimmed = secret.trim();
    let bytes: Zeroizing<Vec<u8>> = if trimmed.starts_with('[') {
        Zeroizing::new(serde_json::from_str(trimmed).map_err(|_| KeyLoadError::Encoding)?)
    } else {
        Zeroizing::new(
            bs58::decode(trimmed)
                .into_vec()
                .map_err(|_| KeyLoadError::Encoding)?,
        )
    };

    if bytes.len() != KEYPAIR_LEN {
        return Err(KeyLoadError::Length(bytes.len()));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(KeyLoadError::Invalid("all-zero key rejected".to_string()));
    }
    Keypair::try_from(bytes.as_slice()).map_err(|e| KeyLoadError::Invalid(e.to_string()))
}

pub async fn load_keypair(source: &dyn SecretSource) -> Result<Keypair, KeyLoadError> {
    let secret = source.load().await?;
    parse_keypair(&secret)
}

/// Custody key for the fee vault
#[derive(Clone)]
pub struct FeeVaultSigner {
    keypair: Arc<Keypair>,
}

impl FeeVaultSigner {
    pub async fn from_source(source: &dyn SecretSource) -> Result<Self, KeyLoadError> {
        Ok(Self::from_keypair(load_keypair(source).await?))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl std::fmt::Debug for FeeVaultSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeVaultSigner")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}
