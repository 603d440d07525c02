use serde::{Deserialize, Serialize};

/// Perimeter network policy.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Networking {
    /// Reject plaintext connections at the perimeter.
    #[serde(default)]
    pub enforce_https: bool,
    /// Country allowlist (ISO 3166-1 alpha-2). Empty means all.
    #[serde(default)]
    pub allow_countries: Vec<String>,
    /// Country blocklist.
    #[serde(default)]
    pub block_countries: Vec<String>,
    /// IP/CIDR allowlist. Empty means all.
    #[serde(default)]
    pub allow_ips: Vec<String>,
    /// IP/CIDR blocklist.
    #[serde(default)]
    pub block_ips: Vec<String>,
}
