//! Secret storage contract. `pdk-secret` provides the concrete
//! encrypted-at-rest implementation; this crate only defines the trait so
//! that `pdk-config` and `pdk-executor` can depend on the contract without
//! pulling in the crypto stack.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A single secret value. Always a plain string: provider secrets in both
/// GitHub Actions and Azure Pipelines are scalar, so there is no map
/// variant here (contrast with artifact/job storage, which does need one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretValue(pub String);

impl SecretValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trait for secret storage backends. The concrete `pdk-secret` store
/// encrypts at rest and re-registers every value with the process-wide
/// masker on load, satisfying the "never rendered even across process
/// restarts" invariant in SPEC_FULL.md §3.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret's plaintext value by name.
    async fn get(&self, name: &str) -> Result<SecretValue>;

    /// List all registered secret names (never values).
    async fn list(&self) -> Result<Vec<String>>;

    /// Create or overwrite a secret.
    async fn set(&self, name: &str, value: SecretValue) -> Result<()>;

    /// Remove a secret.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Rewrites known secret literals to `***` in any string passing through
/// output streams. Implementations must be internally synchronized since
/// the masker is a process-wide singleton (SPEC_FULL.md §9).
pub trait Masker: Send + Sync {
    /// Register a literal that must never appear in masked output again.
    fn register(&self, literal: &str);

    /// Mask every case-insensitive occurrence of a registered literal.
    fn mask(&self, input: &str) -> String;
}
