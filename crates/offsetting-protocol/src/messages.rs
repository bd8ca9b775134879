use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CLAIM_ECONOMICS, SIGNATURE_SCHEME};

/// Current UNIX time in fractional seconds, as carried in message timestamps.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Immutable reference to a document in the content store (an IPFS CID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document staged in the content store and referenced as claim technics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicsDocument {
    /// Home coordinates, "lat, lon".
    pub geo: String,
    pub kwh: f64,
}

/// Signature of a claim, tagged with the scheme that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSignature {
    pub scheme: String,
    /// `0x`-prefixed hex signature.
    pub signature: String,
}

impl ClaimSignature {
    pub fn ed25519(signature_hex: String) -> Self {
        Self {
            scheme: SIGNATURE_SCHEME.to_string(),
            signature: signature_hex,
        }
    }
}

/// Usage snapshot published on the status query topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReading {
    pub address: String,
    /// Consumption minus production, kWh.
    pub kwh_current: f64,
    pub timestamp: f64,
}

impl UsageReading {
    pub fn new(address: &str, kwh_current: f64) -> Self {
        Self {
            address: address.to_string(),
            kwh_current,
            timestamp: unix_timestamp(),
        }
    }
}

/// Liability query asking the agent to offset the staged technics.
///
/// Only constructible from a staged [`ContentRef`] and a produced
/// [`ClaimSignature`], so an unsigned or unstaged claim cannot be built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetClaim {
    pub technics: ContentRef,
    pub economics: u64,
    pub promisee: String,
    /// Single entry: scheme -> signature.
    pub promisee_signature: BTreeMap<String, String>,
    pub timestamp: f64,
}

impl OffsetClaim {
    pub fn new(technics: ContentRef, promisee: &str, signature: ClaimSignature) -> Self {
        let mut promisee_signature = BTreeMap::new();
        promisee_signature.insert(signature.scheme, signature.signature);
        Self {
            technics,
            economics: CLAIM_ECONOMICS,
            promisee: promisee.to_string(),
            promisee_signature,
            timestamp: unix_timestamp(),
        }
    }

    /// The promisee signature, if exactly one scheme is present.
    pub fn signature(&self) -> Option<ClaimSignature> {
        if self.promisee_signature.len() != 1 {
            return None;
        }
        self.promisee_signature
            .iter()
            .next()
            .map(|(scheme, signature)| ClaimSignature {
                scheme: scheme.clone(),
                signature: signature.clone(),
            })
    }
}

/// Agent answer to a [`UsageReading`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationStatus {
    pub address: String,
    pub kwh_to_compensate: f64,
    #[serde(default)]
    pub last_compensation_date: Option<String>,
}

/// Agent answer to an [`OffsetClaim`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetReport {
    pub address: String,
    pub success: bool,
    /// Opaque reference to the liability report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Total kWh compensated so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// A response shape the correlated request engine can wait for.
pub trait AgentResponse: serde::de::DeserializeOwned + Send + 'static {
    /// Field whose presence marks a message as this kind of response.
    const DISCRIMINATOR: &'static str;

    fn address(&self) -> &str;
}

impl AgentResponse for CompensationStatus {
    const DISCRIMINATOR: &'static str = "kwh_to_compensate";

    fn address(&self) -> &str {
        &self.address
    }
}

impl AgentResponse for OffsetReport {
    const DISCRIMINATOR: &'static str = "success";

    fn address(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_carries_single_signature() {
        let claim = OffsetClaim::new(
            ContentRef::new("QmTechnics"),
            "4Promisee",
            ClaimSignature::ed25519("0xabcd".into()),
        );
        assert_eq!(claim.economics, 0);
        assert_eq!(claim.promisee_signature.get("ED25519").map(String::as_str), Some("0xabcd"));
        assert_eq!(claim.signature(), Some(ClaimSignature::ed25519("0xabcd".into())));
    }

    #[test]
    fn test_timestamp_is_recent() {
        let now = chrono::Utc::now().timestamp() as f64;
        let reading = UsageReading::new("addr", 1.5);
        assert!((reading.timestamp - now).abs() < 5.0);
    }

    #[test]
    fn test_failure_report_without_total() {
        let report: OffsetReport =
            serde_json::from_value(serde_json::json!({"address": "a", "success": false})).unwrap();
        assert!(!report.success);
        assert!(report.report.is_none());
        assert!(report.total.is_none());
    }
}
