use serde::{Deserialize, Serialize};

/// A pre-shared API token. The token itself is opaque;
/// issuance happens outside the gateway.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiToken {
    pub name: String,
    pub token: String,
}

/// JWT verifier parameters. Token verification happens at the
/// perimeter; the gateway consumes the verified principal.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Jwt {
    pub issuer: String,
    pub audience: String,
    /// Clock skew tolerance, in milliseconds.
    #[serde(default = "Jwt::leeway_ms")]
    pub leeway_ms: u64,
}

impl Jwt {
    fn leeway_ms() -> u64 {
        30_000
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Auth {
    pub jwt: Option<Jwt>,
    #[serde(default)]
    pub api_tokens: Vec<ApiToken>,
}
