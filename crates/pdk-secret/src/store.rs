use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdk_core::secret::{SecretStore, SecretValue};
use pdk_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::crypto::{self, MasterKey, SALT_SIZE};
use crate::error::SecretError;
use crate::masker::ProcessMasker;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretRecord {
    name: String,
    ciphertext: String,
    iv: String,
    #[serde(rename = "created-at")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretFile {
    salt: String,
    secrets: Vec<SecretRecord>,
}

/// Encrypted-at-rest JSON secret store (SPEC_FULL.md §6). One file holds
/// every secret's `{name, ciphertext, iv, created-at}` record; the key used
/// to seal them is derived once from a machine-scoped key file and never
/// touches disk in derived form.
pub struct FileSecretStore {
    path: PathBuf,
    key: MasterKey,
    file: RwLock<SecretFile>,
    masker: Arc<ProcessMasker>,
}

impl FileSecretStore {
    /// Open (creating if absent) the secret store at `path`, using
    /// `key_file_path` as the machine-scoped key material file.
    pub async fn open(
        path: impl Into<PathBuf>,
        key_file_path: impl AsRef<Path>,
        masker: Arc<ProcessMasker>,
    ) -> Result<Self> {
        let path = path.into();
        let key_material = load_or_create_key_material(key_file_path.as_ref())?;

        let file = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(SecretError::Io)?;
            serde_json::from_str::<SecretFile>(&raw)
                .map_err(|e| SecretError::Corrupt(e.to_string()))?
        } else {
            let salt = crypto::random_salt();
            let fresh = SecretFile {
                salt: base64_encode(&salt),
                secrets: Vec::new(),
            };
            write_file_locked(&path, &fresh)?;
            fresh
        };

        let salt = decode_salt(&file.salt)?;
        let key = crypto::derive_master_key(&key_material, &salt);

        let store = Self {
            path,
            key,
            file: RwLock::new(file),
            masker,
        };
        store.register_all_with_masker().await?;
        Ok(store)
    }

    async fn register_all_with_masker(&self) -> Result<()> {
        let file = self.file.read().await;
        for record in &file.secrets {
            let plaintext = crypto::open(&record.iv, &record.ciphertext, &self.key)
                .map_err(Error::from)?;
            if let Ok(value) = String::from_utf8(plaintext) {
                self.masker.register(&value);
            }
        }
        Ok(())
    }

    async fn persist(&self, file: &SecretFile) -> Result<()> {
        write_file_locked(&self.path, file).map_err(Error::from)
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        let file = self.file.read().await;
        let record = file
            .secrets
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;
        let plaintext = crypto::open(&record.iv, &record.ciphertext, &self.key)?;
        let value = String::from_utf8(plaintext)
            .map_err(|e| SecretError::Corrupt(format!("non-utf8 secret value: {e}")))?;
        Ok(SecretValue(value))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let file = self.file.read().await;
        Ok(file.secrets.iter().map(|r| r.name.clone()).collect())
    }

    async fn set(&self, name: &str, value: SecretValue) -> Result<()> {
        let (iv, ciphertext) = crypto::seal(value.as_str().as_bytes(), &self.key)?;
        self.masker.register(value.as_str());

        let mut file = self.file.write().await;
        file.secrets.retain(|r| r.name != name);
        file.secrets.push(SecretRecord {
            name: name.to_string(),
            ciphertext,
            iv,
            created_at: Utc::now(),
        });
        self.persist(&file).await?;
        tracing::debug!(secret = name, "stored secret");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut file = self.file.write().await;
        let before = file.secrets.len();
        file.secrets.retain(|r| r.name != name);
        if file.secrets.len() == before {
            return Err(SecretError::NotFound(name.to_string()).into());
        }
        self.persist(&file).await?;
        tracing::debug!(secret = name, "deleted secret");
        Ok(())
    }
}

fn write_file_locked(path: &Path, file: &SecretFile) -> std::result::Result<(), SecretError> {
    let body = serde_json::to_string_pretty(file).map_err(|e| SecretError::Corrupt(e.to_string()))?;
    std::fs::write(path, body)?;
    set_owner_only_permissions(path)?;
    Ok(())
}

fn load_or_create_key_material(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        let raw = std::fs::read(path).map_err(SecretError::Io)?;
        return Ok(raw);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(SecretError::Io)?;
    }
    let material = crypto::random_salt();
    std::fs::write(path, material).map_err(SecretError::Io)?;
    set_owner_only_permissions(path).map_err(Error::from)?;
    Ok(material.to_vec())
}

fn decode_salt(encoded: &str) -> Result<[u8; SALT_SIZE]> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SecretError::Corrupt(format!("invalid salt: {e}")))?;
    decoded
        .try_into()
        .map_err(|_| SecretError::Corrupt("salt has wrong length".to_string()).into())
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::result::Result<(), SecretError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> std::result::Result<(), SecretError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masker() -> Arc<ProcessMasker> {
        Arc::new(ProcessMasker::new())
    }

    #[tokio::test]
    async fn set_then_get_roundtrips_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(
            dir.path().join("secrets.json"),
            dir.path().join("store.key"),
            masker(),
        )
        .await
        .unwrap();

        store
            .set("DEPLOY_TOKEN", SecretValue("tok-abc123".to_string()))
            .await
            .unwrap();

        let value = store.get("DEPLOY_TOKEN").await.unwrap();
        assert_eq!(value.as_str(), "tok-abc123");
    }

    #[tokio::test]
    async fn list_reflects_set_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(
            dir.path().join("secrets.json"),
            dir.path().join("store.key"),
            masker(),
        )
        .await
        .unwrap();

        store.set("A", SecretValue("1".to_string())).await.unwrap();
        store.set("B", SecretValue("2".to_string())).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.delete("A").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn get_missing_secret_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(
            dir.path().join("secrets.json"),
            dir.path().join("store.key"),
            masker(),
        )
        .await
        .unwrap();
        assert!(store.get("NOPE").await.is_err());
    }

    #[tokio::test]
    async fn ciphertext_on_disk_never_contains_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("secrets.json");
        let store = FileSecretStore::open(&store_path, dir.path().join("store.key"), masker())
            .await
            .unwrap();

        store
            .set("VERY_SECRET", SecretValue("unmistakable-plaintext".to_string()))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&store_path).unwrap();
        assert!(!raw.contains("unmistakable-plaintext"));
    }

    #[tokio::test]
    async fn reopening_store_decrypts_previously_written_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("secrets.json");
        let key_path = dir.path().join("store.key");

        {
            let store = FileSecretStore::open(&store_path, &key_path, masker())
                .await
                .unwrap();
            store
                .set("PERSISTED", SecretValue("stays-put".to_string()))
                .await
                .unwrap();
        }

        let reopened = FileSecretStore::open(&store_path, &key_path, masker())
            .await
            .unwrap();
        let value = reopened.get("PERSISTED").await.unwrap();
        assert_eq!(value.as_str(), "stays-put");
    }
}
