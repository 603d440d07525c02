//! Perimeter authentication. Token verification happens upstream; the
//! gateway consumes a verified principal and an API-token allowlist.

use std::collections::HashSet;

use workersql_config::Auth;

use crate::frontend::Error;
use crate::routing::TenantId;

/// A verified caller. Every request is scoped to the principal's
/// tenant before the classifier runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub tenant_id: TenantId,
}

impl Principal {
    pub fn new(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }

    /// Extract the principal from verified JWT claims.
    pub fn from_claims(claims: &serde_json::Value) -> Result<Self, Error> {
        let tenant = claims
            .get("tenant_id")
            .or_else(|| claims.get("tid"))
            .and_then(|value| value.as_str())
            .filter(|tenant| !tenant.is_empty())
            .ok_or(Error::Auth)?;
        Ok(Self::new(tenant))
    }
}

/// Pre-shared API tokens from configuration.
#[derive(Debug, Default)]
pub struct ApiTokens {
    tokens: HashSet<String>,
}

impl ApiTokens {
    pub fn from_config(auth: &Auth) -> Self {
        Self {
            tokens: auth
                .api_tokens
                .iter()
                .map(|token| token.token.clone())
                .collect(),
        }
    }

    /// An empty allowlist admits nobody over the token scheme.
    pub fn authorize(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

#[cfg(test)]
mod test {
    use workersql_config::ApiToken;

    use super::*;

    #[test]
    fn test_from_claims() {
        let claims = serde_json::json!({ "tenant_id": "t1", "sub": "user" });
        assert_eq!(
            Principal::from_claims(&claims).unwrap(),
            Principal::new("t1")
        );

        let claims = serde_json::json!({ "tid": "t2" });
        assert_eq!(
            Principal::from_claims(&claims).unwrap(),
            Principal::new("t2")
        );

        assert!(Principal::from_claims(&serde_json::json!({})).is_err());
        assert!(Principal::from_claims(&serde_json::json!({ "tenant_id": "" })).is_err());
    }

    #[test]
    fn test_api_tokens() {
        let auth = Auth {
            jwt: None,
            api_tokens: vec![ApiToken {
                name: "ci".into(),
                token: "secret".into(),
            }],
        };
        let tokens = ApiTokens::from_config(&auth);
        assert!(tokens.authorize("secret"));
        assert!(!tokens.authorize("wrong"));
        assert!(!ApiTokens::default().authorize("secret"));
    }
}
