//! Object-store abstraction over S3, so the backup manager can be exercised
//! without a live bucket (mirrors the testability pattern of
//! [`hdev_llm::LlmClient`]: a narrow async trait, one production
//! implementation, one scripted double for tests).

use async_trait::async_trait;

/// Minimal key/value object operations the backup manager needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `body` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), String>;

    /// Download the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, String>;

    /// List every key under `prefix` (no delimiter — full enumeration).
    async fn list(&self, prefix: &str) -> Result<Vec<String>, String>;

    /// List the immediate "directories" under `prefix` (keys up to the next
    /// `/`), used by [`crate::S3BackupManager::list_backups`].
    async fn list_common_prefixes(&self, prefix: &str) -> Result<Vec<String>, String>;

    /// Delete a single object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), String>;

    /// Delete every object under `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), String> {
        for key in self.list(prefix).await? {
            self.delete(&key).await?;
        }
        Ok(())
    }
}

/// Production [`ObjectStore`] backed by an S3-compatible bucket via
/// `rust-s3` (spec §4.E, grounded in `heare/developer/s3_backup.py`'s
/// `boto3` client).
pub struct RustS3Store {
    bucket: Box<s3::Bucket>,
}

impl RustS3Store {
    /// Open a bucket in `region` (pass a `Region::Custom` for S3-compatible
    /// endpoints) using static credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket handle cannot be constructed (invalid
    /// region or credentials).
    pub fn new(bucket_name: &str, region: s3::Region, credentials: s3::creds::Credentials) -> Result<Self, String> {
        let bucket = s3::Bucket::new(bucket_name, region, credentials).map_err(|e| e.to_string())?;
        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for RustS3Store {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), String> {
        self.bucket.put_object(key, &body).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, String> {
        let response = self.bucket.get_object(key).await.map_err(|e| e.to_string())?;
        Ok(response.bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, String> {
        let pages = self.bucket.list(prefix.to_string(), None).await.map_err(|e| e.to_string())?;
        Ok(pages.into_iter().flat_map(|page| page.contents).map(|obj| obj.key).collect())
    }

    async fn list_common_prefixes(&self, prefix: &str) -> Result<Vec<String>, String> {
        let pages = self
            .bucket
            .list(prefix.to_string(), Some("/".to_string()))
            .await
            .map_err(|e| e.to_string())?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.common_prefixes.unwrap_or_default())
            .map(|p| p.prefix)
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        self.bucket.delete_object(key).await.map_err(|e| e.to_string())?;
        Ok(())
    }
}
