//! Offset claim signing.
//!
//! The promisee signs `technics_digest (32 bytes) || economics (u128 LE)`.
//! The technics digest is the sha2-256 digest carried by the content
//! reference's multihash; references that are not sha2-256 CIDs fall back
//! to the SHA-256 of the reference string.

use std::str::FromStr;

use cid::Cid;
use ed25519_dalek::{Signature, VerifyingKey};

use crate::crypto::{hex_decode, sha256, verify_signature, Account};
use crate::messages::{ClaimSignature, ContentRef};
use crate::{ProtocolError, SIGNATURE_SCHEME};

const SHA2_256_CODE: u64 = 0x12;

/// Signs offset claims on behalf of an account.
#[derive(Debug, Clone)]
pub struct ClaimSigner {
    account: Account,
}

impl ClaimSigner {
    pub fn new(account: Account) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Bind a staged content reference and an economic term to the account.
    pub fn sign(&self, technics: &ContentRef, economics: u64) -> Result<ClaimSignature, ProtocolError> {
        let payload = signing_payload(technics, economics);
        let signature = self.account.try_sign(&payload)?;
        Ok(ClaimSignature::ed25519(format!(
            "0x{}",
            hex::encode(signature.to_bytes())
        )))
    }
}

/// 32-byte digest identifying the technics document.
pub fn technics_digest(technics: &ContentRef) -> [u8; 32] {
    if let Ok(cid) = Cid::from_str(technics.as_str()) {
        let hash = cid.hash();
        if hash.code() == SHA2_256_CODE {
            if let Ok(digest) = <[u8; 32]>::try_from(hash.digest()) {
                return digest;
            }
        }
    }
    sha256(technics.as_str().as_bytes())
}

fn signing_payload(technics: &ContentRef, economics: u64) -> Vec<u8> {
    let digest = technics_digest(technics);
    let economics = u128::from(economics).to_le_bytes();
    [digest.as_slice(), economics.as_slice()].concat()
}

/// Verify a claim signature against the promisee's public key.
pub fn verify_claim_signature(
    verifying_key: &VerifyingKey,
    technics: &ContentRef,
    economics: u64,
    signature: &ClaimSignature,
) -> Result<(), ProtocolError> {
    if signature.scheme != SIGNATURE_SCHEME {
        return Err(ProtocolError::InvalidSignature(format!(
            "unsupported scheme '{}'",
            signature.scheme
        )));
    }
    let bytes = hex_decode(signature.signature.trim_start_matches("0x"))?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| ProtocolError::InvalidSignature("signature wrong length".into()))?;
    let signature = Signature::from_bytes(&bytes);
    verify_signature(verifying_key, &signing_payload(technics, economics), &signature)
}
