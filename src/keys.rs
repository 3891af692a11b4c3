use bitcoin::key::{PrivateKey, PublicKey};
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::{Address, Network};
use std::fmt;
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

/// Length of raw private key material in bytes.
pub const SECRET_LENGTH: usize = 32;

/// Errors from key import and encoding.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secret is not a valid curve scalar")]
    InvalidSecret(#[source] bitcoin::secp256k1::Error),
}

/// 256-bit private key material plus the flag selecting compressed public
/// key serialization. The bytes are wiped when the value is dropped.
#[derive(ZeroizeOnDrop)]
pub struct Secret {
    bytes: [u8; SECRET_LENGTH],
    compressed: bool,
}

impl Secret {
    /// Imports raw bytes, rejecting values outside the curve order.
    pub fn from_slice(bytes: &[u8], compressed: bool) -> Result<Self, KeyError> {
        let key = SecretKey::from_slice(bytes).map_err(KeyError::InvalidSecret)?;
        Ok(Self {
            bytes: key.secret_bytes(),
            compressed,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.bytes
    }

    /// Wallet Import Format encoding for the given network.
    pub fn to_wif(&self, network: Network) -> Result<String, KeyError> {
        let key = SecretKey::from_slice(&self.bytes).map_err(KeyError::InvalidSecret)?;
        Ok(private_key(&key, self.compressed, network).to_wif())
    }

    /// Re-derives the P2PKH address for this secret.
    pub fn p2pkh_address(&self, secp: &Secp256k1<All>, network: Network) -> Result<String, KeyError> {
        let key = SecretKey::from_slice(&self.bytes).map_err(KeyError::InvalidSecret)?;
        Ok(derive_p2pkh(secp, &key, self.compressed, network))
    }
}

impl fmt::Debug for Secret {
    /// Keeps key material out of logs and panic messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("bytes", &"[REDACTED]")
            .field("compressed", &self.compressed)
            .finish()
    }
}

fn private_key(key: &SecretKey, compressed: bool, network: Network) -> PrivateKey {
    if compressed {
        PrivateKey::new(*key, network)
    } else {
        PrivateKey::new_uncompressed(*key, network)
    }
}

/// Derives the legacy pay-to-public-key-hash address for a secret key.
pub fn derive_p2pkh(
    secp: &Secp256k1<All>,
    key: &SecretKey,
    compressed: bool,
    network: Network,
) -> String {
    let privkey = private_key(key, compressed, network);
    let pubkey = PublicKey::from_private_key(secp, &privkey);
    Address::p2pkh(&pubkey, network).to_string()
}

/// Network selection: mainnet unless `BTK_TESTNET` is set in the environment.
pub fn current_network() -> Network {
    if std::env::var_os("BTK_TESTNET").is_some() {
        Network::Testnet
    } else {
        Network::Bitcoin
    }
}
