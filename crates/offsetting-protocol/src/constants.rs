/// Topic the household publishes its usage reading to.
pub const STATUS_QUERY_TOPIC: &str = "last_compensation_date_query";
/// Topic the agent answers usage readings on.
pub const STATUS_RESPONSE_TOPIC: &str = "last_compensation_date_response";
/// Topic offset claims (liability queries) are published to.
pub const CLAIM_QUERY_TOPIC: &str = "liability_query";
/// Topic the agent publishes liability reports on.
pub const CLAIM_RESPONSE_TOPIC: &str = "liability_report";

/// Default agent node RPC endpoint.
pub const DEFAULT_RPC_ENDPOINT: &str = "wss://kusama.rpc.robonomics.network/";
/// Multiaddr of the offsetting agent's pub/sub node.
pub const DEFAULT_AGENT_NODE: &str = "/dns/robonomics.rpc.multi-agent.io/tcp/44440";
/// Local IPFS API, used when no gateway is configured.
pub const DEFAULT_IPFS_GATEWAY: &str = "/ip4/127.0.0.1/tcp/5001/http";

/// Deadline for a compensation status round trip.
pub const STATUS_TIMEOUT_SECS: u64 = 10;
/// Deadline for an offset claim round trip (includes staging and agent-side consensus).
pub const CLAIM_TIMEOUT_SECS: u64 = 120;
/// Wait between connecting to the bus and publishing.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;

/// Signature scheme key used in `promisee_signature`.
pub const SIGNATURE_SCHEME: &str = "ED25519";
/// Economic term of every claim.
pub const CLAIM_ECONOMICS: u64 = 0;
/// Network prefix byte of account addresses.
pub const ADDRESS_PREFIX: u8 = 32;
