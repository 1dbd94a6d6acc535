//! Operator authentication: HTTP Basic credentials checked against a
//! credentials file. Runs before the request body is ever parsed.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::Map;
use crate::resources::Principal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub principal: Principal,
    pub secret: String,
}

#[derive(Debug, Default)]
pub struct CredentialStore {
    secrets: Map<Principal, String>,
}

impl CredentialStore {
    pub fn new<I: IntoIterator<Item = Credential>>(credentials: I) -> Self {
        CredentialStore {
            secrets: credentials
                .into_iter()
                .map(|c| (c.principal, c.secret))
                .collect(),
        }
    }

    /// Loads a JSON list of `{"principal": …, "secret": …}` entries.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let credentials: Vec<Credential> = serde_json::from_str(&data)?;
        Ok(Self::new(credentials))
    }

    /// Validates an `Authorization: Basic …` header value and returns the
    /// authenticated principal. Secrets are compared in constant time.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, String> {
        let header = authorization.ok_or_else(|| "missing authorization header".to_string())?;
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| "unsupported authorization scheme".to_string())?;
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| "invalid base64 in authorization header".to_string())?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| "invalid credentials encoding".to_string())?;
        let (principal, secret) = decoded
            .split_once(':')
            .ok_or_else(|| "malformed basic credentials".to_string())?;

        let expected = self
            .secrets
            .get(principal)
            .ok_or_else(|| format!("unknown principal {principal:?}"))?;
        if orion::util::secure_cmp(secret.as_bytes(), expected.as_bytes()).is_err() {
            return Err(format!("invalid secret for principal {principal:?}"));
        }
        Ok(principal.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new([Credential {
            principal: "ops".to_string(),
            secret: "hunter2".to_string(),
        }])
    }

    fn basic(user: &str, secret: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{user}:{secret}")))
    }

    #[test]
    fn test_authenticate_ok() {
        let header = basic("ops", "hunter2");
        assert_eq!(store().authenticate(Some(&header)).unwrap(), "ops");
    }

    #[test]
    fn test_missing_header() {
        assert!(store().authenticate(None).is_err());
    }

    #[test]
    fn test_bad_credentials() {
        let store = store();
        assert!(store.authenticate(Some(&basic("ops", "wrong"))).is_err());
        assert!(store.authenticate(Some(&basic("nobody", "hunter2"))).is_err());
        assert!(store.authenticate(Some("Bearer token")).is_err());
        assert!(store.authenticate(Some("Basic not-base64!")).is_err());
    }
}
