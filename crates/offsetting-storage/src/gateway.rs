//! Gateway endpoint and credential handling.

use std::fmt;

use offsetting_protocol::Account;

use crate::StorageError;

/// How to authenticate against the IPFS gateway.
#[derive(Clone, Default)]
pub enum GatewayAuth {
    /// No credentials configured.
    #[default]
    None,
    /// Plain login / password.
    Basic { login: String, password: String },
    /// Web3 gateway: login `sub-<address>`, password signed by the account.
    /// Regenerated for every upload.
    Web3(Account),
}

impl GatewayAuth {
    /// Basic-auth pair to send, if any.
    pub fn credentials(&self) -> Result<Option<(String, String)>, StorageError> {
        match self {
            GatewayAuth::None => Ok(None),
            GatewayAuth::Basic { login, password } => Ok(Some((login.clone(), password.clone()))),
            GatewayAuth::Web3(account) => account
                .web3_auth_credentials()
                .map(Some)
                .map_err(|e| StorageError::Credentials(e.to_string())),
        }
    }
}

impl fmt::Debug for GatewayAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayAuth::None => f.write_str("None"),
            GatewayAuth::Basic { login, .. } => f
                .debug_struct("Basic")
                .field("login", login)
                .field("password", &"<redacted>")
                .finish(),
            GatewayAuth::Web3(account) => f.debug_tuple("Web3").field(&account.address()).finish(),
        }
    }
}

/// Convert a gateway endpoint to a base URL.
///
/// Accepts URLs as-is and multiaddrs of the form
/// `/ip4|ip6|dns|dns4|dns6/<host>/tcp/<port>[/http|/https]`.
pub fn gateway_url(endpoint: &str) -> Result<String, StorageError> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Ok(endpoint.trim_end_matches('/').to_string());
    }
    if !endpoint.starts_with('/') {
        return Err(StorageError::InvalidEndpoint(endpoint.to_string()));
    }

    let invalid = || StorageError::InvalidEndpoint(endpoint.to_string());
    let mut parts = endpoint.split('/').filter(|p| !p.is_empty());
    let mut host = None;
    let mut port = None;
    let mut scheme = "http";

    while let Some(protocol) = parts.next() {
        match protocol {
            "ip4" | "dns" | "dns4" | "dns6" | "dnsaddr" => {
                host = Some(parts.next().ok_or_else(invalid)?.to_string());
            }
            "ip6" => {
                host = Some(format!("[{}]", parts.next().ok_or_else(invalid)?));
            }
            "tcp" => {
                let value = parts.next().ok_or_else(invalid)?;
                port = Some(value.parse::<u16>().map_err(|_| invalid())?);
            }
            "http" => scheme = "http",
            "https" | "tls" => scheme = "https",
            _ => return Err(invalid()),
        }
    }

    let host = host.ok_or_else(invalid)?;
    Ok(match port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    })
}
