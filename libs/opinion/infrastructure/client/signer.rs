//! Order signing facade
//!
//! Wraps the account's wallet behind a minimal surface: an address and a
//! payload signature. Signing material is injected at construction and never
//! appears in logs or Debug output.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("invalid private key")]
    InvalidKey,

    #[error("signing failed: {0}")]
    Signing(String),
}

pub struct OrderSigner {
    wallet: LocalWallet,
}

impl OrderSigner {
    pub fn new(private_key: &str) -> Result<Self, SignerError> {
        let key = private_key.trim().trim_start_matches("0x");
        let wallet: LocalWallet = key.parse().map_err(|_| SignerError::InvalidKey)?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Sign an order payload; returns the 0x-prefixed signature hex.
    pub async fn sign(&self, payload: &str) -> Result<String, SignerError> {
        let signature = self
            .wallet
            .sign_message(payload.as_bytes())
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(format!("0x{signature}"))
    }
}

impl std::fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSigner")
            .field("address", &self.wallet.address())
            .finish()
    }
}
