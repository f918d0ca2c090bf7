//! Administrator access checks.

use crate::admin::AdminSession;
use crate::config::AdminConfig;
use crate::error::{Error, Result};
use crate::identity::EmployeeId;
use crate::store::TaskStore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Hex SHA-256 of a shared secret, the form stored in `admin.secret_sha256`.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Who may open an [`AdminSession`].
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    allow_list: Vec<String>,
    secret_sha256: Option<String>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::from_config(&AdminConfig::default())
    }
}

impl AccessPolicy {
    pub fn from_config(config: &AdminConfig) -> Self {
        Self {
            allow_list: config
                .allow_list
                .iter()
                .map(|id| id.trim().to_lowercase())
                .collect(),
            secret_sha256: config.secret_sha256.as_ref().map(|d| d.to_lowercase()),
        }
    }

    /// Whether the id is on the allow-list. Malformed ids never are.
    pub fn is_admin(&self, raw_id: &str) -> bool {
        EmployeeId::parse(raw_id)
            .map(|id| self.allow_list.iter().any(|a| a == id.as_str()))
            .unwrap_or(false)
    }

    pub fn requires_secret(&self) -> bool {
        self.secret_sha256.is_some()
    }

    /// Check the id (and secret, when one is configured) and open a session.
    pub fn authorize(
        &self,
        raw_id: &str,
        secret: Option<&str>,
        store: Arc<dyn TaskStore>,
    ) -> Result<AdminSession> {
        let employee_id =
            EmployeeId::parse(raw_id).map_err(|_| Error::Unauthorized(raw_id.to_string()))?;

        if !self.allow_list.iter().any(|a| a == employee_id.as_str()) {
            tracing::warn!(employee_id = %employee_id, "Admin access denied: not on allow-list");
            return Err(Error::Unauthorized(format!(
                "{} is not an administrator",
                employee_id
            )));
        }

        if let Some(expected) = &self.secret_sha256 {
            let matches = secret.map(hash_secret).as_deref() == Some(expected.as_str());
            if !matches {
                tracing::warn!(employee_id = %employee_id, "Admin access denied: bad secret");
                return Err(Error::Unauthorized("admin secret did not match".to_string()));
            }
        }

        tracing::info!(employee_id = %employee_id, "Admin session opened");
        Ok(AdminSession::new(employee_id, store))
    }
}
