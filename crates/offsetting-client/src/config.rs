//! Client configuration (TOML).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use offsetting_network::RpcPubSubConfig;
use offsetting_protocol::{
    Account, CLAIM_TIMEOUT_SECS, DEFAULT_AGENT_NODE, DEFAULT_IPFS_GATEWAY, DEFAULT_RPC_ENDPOINT,
    DEFAULT_SETTLE_DELAY_MS, STATUS_TIMEOUT_SECS,
};
use offsetting_storage::GatewayAuth;
use serde::{Deserialize, Serialize};

use crate::session::SessionConfig;
use crate::ClientError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    pub energy: EnergyConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub ipfs: IpfsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// `0x`-prefixed hex seed or mnemonic phrase.
    pub seed: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig").field("seed", &"<redacted>").finish()
    }
}

/// A meter reading as written in the file: a number or the raw sensor text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Number(value) => write!(f, "{value}"),
            Reading::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyConfig {
    /// Consumption meter readings, kWh.
    #[serde(default)]
    pub consumption: Vec<Reading>,
    /// Production meter readings, kWh.
    #[serde(default)]
    pub production: Vec<Reading>,
    /// Home coordinates, "lat, lon".
    pub geo: String,
}

impl EnergyConfig {
    pub fn consumption_readings(&self) -> Vec<String> {
        self.consumption.iter().map(ToString::to_string).collect()
    }

    pub fn production_readings(&self) -> Vec<String> {
        self.production.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,
    /// Multiaddr of the offsetting agent's pub/sub node.
    #[serde(default = "default_agent_node")]
    pub agent_node: String,
    /// Wait after connecting before publishing, milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: default_rpc_endpoint(),
            agent_node: default_agent_node(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    DEFAULT_RPC_ENDPOINT.to_string()
}

fn default_agent_node() -> String {
    DEFAULT_AGENT_NODE.to_string()
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// Gateway URL or multiaddr.
    #[serde(default = "default_ipfs_gateway")]
    pub gateway: String,
    /// Authenticate with credentials derived from the account.
    #[serde(default)]
    pub web3_auth: bool,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            gateway: default_ipfs_gateway(),
            web3_auth: false,
            login: None,
            password: None,
        }
    }
}

impl fmt::Debug for IpfsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpfsConfig")
            .field("gateway", &self.gateway)
            .field("web3_auth", &self.web3_auth)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_status_secs")]
    pub status_secs: u64,
    #[serde(default = "default_claim_secs")]
    pub claim_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            status_secs: default_status_secs(),
            claim_secs: default_claim_secs(),
        }
    }
}

fn default_status_secs() -> u64 {
    STATUS_TIMEOUT_SECS
}

fn default_claim_secs() -> u64 {
    CLAIM_TIMEOUT_SECS
}

/// `<config dir>/offsetting/config.toml`, when the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("offsetting").join("config.toml"))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ClientError> {
        toml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Check the settings that cannot be checked by the parser and derive the
    /// account.
    pub fn validate(&self) -> Result<Account, ClientError> {
        let account = Account::from_seed(&self.account.seed)
            .map_err(|e| ClientError::Config(format!("invalid_seed: {e}")))?;

        let ipfs = &self.ipfs;
        if ipfs.web3_auth && (ipfs.login.is_some() || ipfs.password.is_some()) {
            return Err(ClientError::Config(
                "invalid_ipfs_creds: web3_auth cannot be combined with login/password".into(),
            ));
        }
        if ipfs.login.is_some() != ipfs.password.is_some() {
            return Err(ClientError::Config(
                "invalid_ipfs_creds: login and password must be given together".into(),
            ));
        }
        if self.energy.geo.trim().is_empty() {
            return Err(ClientError::Config("geo must not be empty".into()));
        }
        Ok(account)
    }

    pub fn gateway_auth(&self, account: &Account) -> GatewayAuth {
        match (&self.ipfs.login, &self.ipfs.password) {
            _ if self.ipfs.web3_auth => GatewayAuth::Web3(account.clone()),
            (Some(login), Some(password)) => GatewayAuth::Basic {
                login: login.clone(),
                password: password.clone(),
            },
            _ => GatewayAuth::None,
        }
    }

    pub fn rpc_config(&self) -> RpcPubSubConfig {
        RpcPubSubConfig {
            endpoint: self.transport.rpc_endpoint.clone(),
            agent_node: self.transport.agent_node.clone(),
            settle_delay: Duration::from_millis(self.transport.settle_delay_ms),
            ..Default::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            geo: self.energy.geo.clone(),
            status_deadline: Duration::from_secs(self.timeouts.status_secs),
            claim_deadline: Duration::from_secs(self.timeouts.claim_secs),
        }
    }
}
