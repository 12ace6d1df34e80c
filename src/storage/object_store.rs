//! S3 object store backend
//!
//! Object stores have a flat key namespace: "folders" are key prefixes that
//! exist implicitly, moves are copy + delete, and existence checks are HEAD
//! requests.

use super::{base_name, join_path, parent_of, StorageBackend, StorageError};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;

pub struct ObjectStoreBackend {
    client: Client,
    bucket: String,
}

impl ObjectStoreBackend {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the default AWS credential chain
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List one level below `container`, returning (files, folders)
    async fn list_level(&self, container: &str) -> Result<(Vec<String>, Vec<String>), StorageError> {
        let prefix = container_prefix(container);
        let mut files = Vec::new();
        let mut folders = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .delimiter("/");
            if !prefix.is_empty() {
                request = request.prefix(&prefix);
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| {
                StorageError::Backend(format!(
                    "Failed to list s3://{}/{}: {}",
                    self.bucket,
                    prefix,
                    DisplayErrorContext(&e)
                ))
            })?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    // Skip the container marker itself
                    if key != prefix {
                        files.push(key.to_string());
                    }
                }
            }
            for common in output.common_prefixes() {
                if let Some(p) = common.prefix() {
                    folders.push(p.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok((files, folders))
    }

    async fn copy_then_delete(&self, source: &str, target: &str) -> Result<(), StorageError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source))
            .key(target)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "Failed to copy {} to {}: {}",
                    source,
                    target,
                    DisplayErrorContext(&e)
                ))
            })?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(source)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "Copied {} but failed to delete the source: {}",
                    source,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }
}

/// Normalize a container identifier to a listing prefix ("" or "a/b/")
fn container_prefix(container: &str) -> String {
    let trimmed = container.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// `CopySource` value: bucket/key with the key percent-encoded
fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    format!("{}/{}", bucket, encoded)
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "object_store"
    }

    async fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.list_level(container).await?.0)
    }

    async fn list_folders(&self, container: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.list_level(container).await?.1)
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_key()).unwrap_or(false) {
                    StorageError::NotFound(id.to_string())
                } else {
                    StorageError::Backend(format!(
                        "Failed to download {}: {}",
                        id,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read body of {}: {}", id, e)))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(StorageError::Backend(format!(
                "Failed to check {}: {}",
                id,
                DisplayErrorContext(&e)
            ))),
        }
    }

    async fn move_object(&self, source: &str, target: &str) -> Result<(), StorageError> {
        self.copy_then_delete(source, target).await
    }

    async fn rename(&self, source: &str, new_name: &str) -> Result<String, StorageError> {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(StorageError::InvalidIdentifier(format!(
                "'{}' is not a plain file name",
                new_name
            )));
        }
        if base_name(source) == new_name {
            return Ok(source.to_string());
        }
        let target = join_path(parent_of(source), new_name);
        self.copy_then_delete(source, &target).await?;
        Ok(target)
    }

    async fn create_container(&self, path: &str) -> Result<(), StorageError> {
        // Prefixes exist as soon as an object is written under them
        tracing::debug!("[ObjectStore] Container {} is implicit", container_prefix(path));
        Ok(())
    }

    async fn is_container(&self, id: &str) -> Result<bool, StorageError> {
        if id.is_empty() || id.ends_with('/') {
            return Ok(true);
        }
        if self.exists(id).await? {
            return Ok(false);
        }

        // Without a trailing slash, a prefix with any object below it is a container
        let prefix = container_prefix(id);
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "Failed to inspect s3://{}/{}: {}",
                    self.bucket,
                    prefix,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(!output.contents().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_prefix() {
        assert_eq!(container_prefix(""), "");
        assert_eq!(container_prefix("incoming"), "incoming/");
        assert_eq!(container_prefix("incoming/"), "incoming/");
        assert_eq!(container_prefix("/sorted/Finance"), "sorted/Finance/");
    }

    #[test]
    fn test_copy_source_encodes_key() {
        assert_eq!(
            copy_source("bucket", "incoming/Q1 report (final).pdf"),
            "bucket/incoming/Q1%20report%20%28final%29.pdf"
        );
        assert_eq!(copy_source("bucket", "a/b_c-1.txt"), "bucket/a/b_c-1.txt");
    }
}
