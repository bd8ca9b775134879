use multihash_codetable::{Code, MultihashDigest};
use offsetting_protocol::*;

fn staged_ref(document: &[u8]) -> ContentRef {
    let hash = Code::Sha2_256.digest(document);
    let cid = cid::Cid::new_v0(hash).unwrap();
    ContentRef::new(cid.to_string())
}

#[test]
fn test_claim_signature_verifies() {
    let signer = ClaimSigner::new(Account::generate());
    let technics = staged_ref(br#"{"geo":"55.75, 37.61","kwh":40.0}"#);

    let signature = signer.sign(&technics, CLAIM_ECONOMICS).unwrap();
    assert_eq!(signature.scheme, "ED25519");
    assert!(signature.signature.starts_with("0x"));
    assert_eq!(signature.signature.len(), 2 + 128);

    let key = signer.account().verifying_key();
    assert!(verify_claim_signature(&key, &technics, CLAIM_ECONOMICS, &signature).is_ok());
}

#[test]
fn test_signature_binds_technics_and_economics() {
    let signer = ClaimSigner::new(Account::generate());
    let technics = staged_ref(b"document one");
    let other = staged_ref(b"document two");
    let signature = signer.sign(&technics, 0).unwrap();
    let key = signer.account().verifying_key();

    assert!(verify_claim_signature(&key, &other, 0, &signature).is_err());
    assert!(verify_claim_signature(&key, &technics, 1, &signature).is_err());

    let stranger = Account::generate().verifying_key();
    assert!(verify_claim_signature(&stranger, &technics, 0, &signature).is_err());
}

#[test]
fn test_signing_is_deterministic() {
    let seed = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    let a = ClaimSigner::new(Account::from_seed(seed).unwrap());
    let b = ClaimSigner::new(Account::from_seed(seed).unwrap());
    let technics = staged_ref(b"same");
    assert_eq!(a.sign(&technics, 0).unwrap(), b.sign(&technics, 0).unwrap());
}

#[test]
fn test_technics_digest_uses_cid_multihash() {
    let document = b"payload";
    let technics = staged_ref(document);
    let expected = Code::Sha2_256.digest(document);
    assert_eq!(technics_digest(&technics).as_slice(), expected.digest());
}

#[test]
fn test_technics_digest_falls_back_for_opaque_refs() {
    let opaque = ContentRef::new("not-a-cid");
    let digest = technics_digest(&opaque);
    assert_eq!(digest, offsetting_protocol::crypto::sha256(b"not-a-cid"));
}

#[test]
fn test_unknown_scheme_rejected() {
    let signer = ClaimSigner::new(Account::generate());
    let technics = staged_ref(b"doc");
    let mut signature = signer.sign(&technics, 0).unwrap();
    signature.scheme = "SR25519".into();
    let key = signer.account().verifying_key();
    assert!(verify_claim_signature(&key, &technics, 0, &signature).is_err());
}
