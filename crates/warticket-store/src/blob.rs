//! Artifact storage with expiring signed URLs.
//!
//! Rendered tickets are written under a key such as `tickets/<number>.pdf` and handed
//! out to clients as `{base}/blobs/{key}?expires=<unix>&signature=<hex>`, where the
//! signature is an HMAC over `<key>:<expires>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::crypto;
use crate::error::{Result, StoreError};

/// A stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Artifact bytes.
    pub bytes: Vec<u8>,
    /// MIME type the artifact was stored with.
    pub content_type: String,
}

/// Issues and checks expiring signed URLs for blob keys.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    /// Create a signer for URLs rooted at `base_url`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Signed URL for `key`, valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Signing` if the URL cannot be signed.
    pub fn sign(&self, key: &str, ttl: Duration) -> Result<String> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        let signature = crypto::sign_expiring(&self.secret, key, expires)?;
        Ok(format!(
            "{}/blobs/{key}?expires={expires}&signature={signature}",
            self.base_url
        ))
    }

    /// Whether `signature` is valid for `key` and `expires` has not passed.
    #[must_use]
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        crypto::verify_hex(
            &self.secret,
            format!("{key}:{expires}").as_bytes(),
            signature,
        )
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Check that a blob key is a relative path of safe segments.
///
/// # Errors
///
/// Returns `StoreError::Blob` if the key is empty, absolute, or escapes the store root.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        });

    if valid {
        Ok(())
    } else {
        Err(StoreError::Blob(format!("invalid blob key: {key:?}")))
    }
}

/// Content type inferred from a key's extension.
#[must_use]
pub fn content_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Object storage for rendered artifacts and event images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write an object, replacing any previous object under the same key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Blob` if the key is invalid or the write fails.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read an object.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Blob` if the key is invalid or the read fails.
    async fn get(&self, key: &str) -> Result<Option<Blob>>;

    /// The signer for this store's public URLs.
    fn signer(&self) -> &UrlSigner;

    /// Signed, expiring URL for an object.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Signing` if the URL cannot be signed.
    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.signer().sign(key, ttl)
    }

    /// Whether a signed URL's parameters are valid for `key`.
    fn verify_signed(&self, key: &str, expires: i64, signature: &str) -> bool {
        self.signer().verify(key, expires, signature)
    }
}

/// Blob store on the local filesystem.
pub struct FsBlobStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Blob` if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>, signer: UrlSigner) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Blob(format!("failed to create {}: {e}", root.display())))?;
        Ok(Self { root, signer })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Blob(e.to_string()))?;
        }

        // Write then rename so readers never see a partial object
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;

        tracing::debug!(key = %key, "Blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Blob {
                bytes,
                content_type: content_type_for(key).to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Blob(e.to_string())),
        }
    }

    fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}

/// Blob store held in process memory.
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Blob>>,
    signer: UrlSigner,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signer,
        }
    }

    /// Keys of all stored objects, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        validate_key(key)?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn signer() -> UrlSigner {
        UrlSigner::new("blob-secret", "https://tickets.example.com/")
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        url.split(['?', '&'])
            .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[test]
    fn signed_url_has_expected_shape() {
        let url = signer()
            .sign("tickets/TIK-1.pdf", Duration::from_secs(900))
            .unwrap();

        assert!(url.starts_with("https://tickets.example.com/blobs/tickets/TIK-1.pdf?expires="));
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let now = Utc::now().timestamp();
        assert!((now + 899..=now + 901).contains(&expires));
    }

    #[test]
    fn signed_url_verifies_for_its_key_only() {
        let signer = signer();
        let url = signer.sign("tickets/a.pdf", Duration::from_secs(60)).unwrap();
        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let signature = query_param(&url, "signature");

        assert!(signer.verify("tickets/a.pdf", expires, signature));
        assert!(!signer.verify("tickets/b.pdf", expires, signature));
        assert!(!signer.verify("tickets/a.pdf", expires + 1, signature));
        assert!(!UrlSigner::new("other", "x").verify("tickets/a.pdf", expires, signature));
    }

    #[test]
    fn expired_signature_is_rejected() {
        let signer = signer();
        let expires = Utc::now().timestamp() - 1;
        let signature = crypto::sign_expiring(b"blob-secret", "tickets/a.pdf", expires).unwrap();

        assert!(!signer.verify("tickets/a.pdf", expires, &signature));
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        for key in ["", "/etc/passwd", "../x.pdf", "tickets/../../x", "a//b", "a b.pdf"] {
            assert!(validate_key(key).is_err(), "{key}");
        }
        assert!(validate_key("tickets/TIK-WT-1-A.pdf").is_ok());
    }

    #[tokio::test]
    async fn fs_store_round_trips_objects() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path(), signer()).await.unwrap();

        store
            .put("tickets/t1.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();

        let blob = store.get("tickets/t1.pdf").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"%PDF-1.4");
        assert_eq!(blob.content_type, "application/pdf");
        assert!(store.get("tickets/missing.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = MemoryBlobStore::new(signer());
        store.put("a.pdf", vec![1], "application/pdf").await.unwrap();
        store.put("a.pdf", vec![2], "application/pdf").await.unwrap();

        assert_eq!(store.get("a.pdf").await.unwrap().unwrap().bytes, vec![2]);
        assert_eq!(store.keys().await, vec!["a.pdf".to_string()]);
    }
}
