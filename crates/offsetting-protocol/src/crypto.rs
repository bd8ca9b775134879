use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::constants::ADDRESS_PREFIX;
use crate::ProtocolError;

const ADDRESS_CHECKSUM_CONTEXT: &[u8] = b"SS58PRE";
const ADDRESS_CHECKSUM_LEN: usize = 2;

/// A household identity: an Ed25519 keypair and the address derived from it.
///
/// Derived once from the configured secret seed and never mutated.
#[derive(Clone)]
pub struct Account {
    signing_key: SigningKey,
    address: String,
}

impl Account {
    /// Derive an account from a secret seed.
    ///
    /// Accepts either a `0x`-prefixed 32-byte hex seed or a BIP-39 mnemonic
    /// phrase (the first 32 bytes of its BIP-39 seed become the key).
    pub fn from_seed(seed: &str) -> Result<Self, ProtocolError> {
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(ProtocolError::InvalidSeed("seed is empty".into()));
        }

        let mut secret: [u8; 32] = if let Some(hex_seed) = seed.strip_prefix("0x") {
            let mut bytes = hex_decode(hex_seed)
                .map_err(|e| ProtocolError::InvalidSeed(e.to_string()))?;
            if bytes.len() != 32 {
                let len = bytes.len();
                bytes.zeroize();
                return Err(ProtocolError::InvalidSeed(format!(
                    "hex seed is {len} bytes, expected 32"
                )));
            }
            let mut secret = [0u8; 32];
            secret.copy_from_slice(&bytes);
            bytes.zeroize();
            secret
        } else {
            let mnemonic = bip39::Mnemonic::parse(seed)
                .map_err(|e| ProtocolError::InvalidSeed(format!("invalid mnemonic: {e}")))?;
            let mut full_seed = mnemonic.to_seed("");
            let mut secret = [0u8; 32];
            secret.copy_from_slice(&full_seed[..32]);
            full_seed.zeroize();
            secret
        };

        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();
        Ok(Self::from_signing_key(signing_key))
    }

    /// Create a fresh random account.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = derive_address(&signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Public address used to tag queries and filter responses.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign an arbitrary payload with the account key.
    pub fn try_sign(&self, payload: &[u8]) -> Result<Signature, ProtocolError> {
        self.signing_key
            .try_sign(payload)
            .map_err(|e| ProtocolError::Signing(e.to_string()))
    }

    /// Credentials for a Web3-authenticated IPFS gateway.
    ///
    /// Login is `sub-<address>`, password is the hex signature of the address.
    pub fn web3_auth_credentials(&self) -> Result<(String, String), ProtocolError> {
        let signature = self.try_sign(self.address.as_bytes())?;
        Ok((
            format!("sub-{}", self.address),
            format!("0x{}", hex::encode(signature.to_bytes())),
        ))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derive the base58 address of a public key.
/// Layout: prefix (1) | public key (32) | checksum (2).
pub fn derive_address(verifying_key: &VerifyingKey) -> String {
    let mut body = Vec::with_capacity(1 + 32 + ADDRESS_CHECKSUM_LEN);
    body.push(ADDRESS_PREFIX);
    body.extend_from_slice(verifying_key.as_bytes());
    let checksum = address_checksum(&body);
    body.extend_from_slice(&checksum[..ADDRESS_CHECKSUM_LEN]);
    bs58::encode(body).into_string()
}

/// Decode an address back into its public key, validating prefix and checksum.
pub fn decode_address(address: &str) -> Result<VerifyingKey, ProtocolError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| ProtocolError::Crypto(format!("invalid address encoding: {e}")))?;
    if bytes.len() != 1 + 32 + ADDRESS_CHECKSUM_LEN {
        return Err(ProtocolError::Crypto(format!(
            "address is {} bytes, expected {}",
            bytes.len(),
            1 + 32 + ADDRESS_CHECKSUM_LEN
        )));
    }
    if bytes[0] != ADDRESS_PREFIX {
        return Err(ProtocolError::Crypto(format!(
            "unexpected address prefix {}",
            bytes[0]
        )));
    }
    let (body, checksum) = bytes.split_at(1 + 32);
    if address_checksum(body)[..ADDRESS_CHECKSUM_LEN] != *checksum {
        return Err(ProtocolError::Crypto("address checksum mismatch".into()));
    }
    let key: [u8; 32] = body[1..]
        .try_into()
        .map_err(|_| ProtocolError::Crypto("public key wrong length".into()))?;
    VerifyingKey::from_bytes(&key).map_err(|e| ProtocolError::Crypto(format!("invalid public key: {e}")))
}

fn address_checksum(body: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ADDRESS_CHECKSUM_CONTEXT);
    hasher.update(body);
    hasher.finalize().into()
}

/// Verify a signature against a public key.
pub fn verify_signature(
    verifying_key: &VerifyingKey,
    payload: &[u8],
    signature: &Signature,
) -> Result<(), ProtocolError> {
    verifying_key
        .verify(payload, signature)
        .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
}

/// Compute SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hex-decode a string into bytes.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, ProtocolError> {
    hex::decode(s).map_err(|e| ProtocolError::Crypto(format!("invalid hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_SEED: &str = "0x9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const MNEMONIC: &str =
        "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

    #[test]
    fn test_hex_seed_is_deterministic() {
        let a = Account::from_seed(HEX_SEED).unwrap();
        let b = Account::from_seed(HEX_SEED).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.verifying_key(), b.verifying_key());
    }

    #[test]
    fn test_mnemonic_seed() {
        let a = Account::from_seed(MNEMONIC).unwrap();
        let b = Account::from_seed(&format!("  {MNEMONIC}\n")).unwrap();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), Account::from_seed(HEX_SEED).unwrap().address());
    }

    #[test]
    fn test_invalid_seeds_rejected() {
        assert!(matches!(Account::from_seed(""), Err(ProtocolError::InvalidSeed(_))));
        assert!(matches!(Account::from_seed("0x1234"), Err(ProtocolError::InvalidSeed(_))));
        assert!(matches!(Account::from_seed("0xzz"), Err(ProtocolError::InvalidSeed(_))));
        assert!(matches!(
            Account::from_seed("not a valid mnemonic phrase at all"),
            Err(ProtocolError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_address_roundtrip() {
        let account = Account::generate();
        let key = decode_address(account.address()).unwrap();
        assert_eq!(key, account.verifying_key());
    }

    #[test]
    fn test_address_checksum_detects_tampering() {
        let account = Account::generate();
        let mut bytes = bs58::decode(account.address()).into_vec().unwrap();
        bytes[5] ^= 0xff;
        let tampered = bs58::encode(bytes).into_string();
        assert!(decode_address(&tampered).is_err());
    }

    #[test]
    fn test_web3_credentials_verify() {
        let account = Account::generate();
        let (login, password) = account.web3_auth_credentials().unwrap();
        assert_eq!(login, format!("sub-{}", account.address()));

        let sig_bytes: [u8; 64] = hex_decode(password.trim_start_matches("0x"))
            .unwrap()
            .try_into()
            .unwrap();
        let sig = Signature::from_bytes(&sig_bytes);
        assert!(verify_signature(&account.verifying_key(), account.address().as_bytes(), &sig).is_ok());
    }

    #[test]
    fn test_debug_hides_key() {
        let account = Account::from_seed(HEX_SEED).unwrap();
        let rendered = format!("{account:?}");
        assert!(rendered.contains(account.address()));
        assert!(!rendered.contains("9d61b19d"));
    }
}
