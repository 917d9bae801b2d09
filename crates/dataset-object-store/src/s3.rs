// crates/dataset-object-store/src/s3.rs
// ============================================================================
// Module: S3 Payload Driver
// Description: Payload driver over an S3-compatible bucket.
// Purpose: Store offloaded item payloads as one object per key.
// Dependencies: aws-config, aws-sdk-s3, dataset-core, serde, tokio
// ============================================================================

//! ## Overview
//! [`S3PayloadDriver`] maps each payload key to the object
//! `<prefix><key>` in a single bucket. Reads are bounded by
//! `max_object_bytes`; a `NoSuchKey` response is reported as a missing
//! payload rather than an error. Deletes are idempotent on the S3 side.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use dataset_core::PayloadDriver;
use dataset_core::PayloadEntry;
use dataset_core::PayloadError;
use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::error::ObjectStoreError;
use crate::key::key_segments;
use crate::key::normalize_prefix;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default read limit for one payload object.
pub const DEFAULT_MAX_OBJECT_BYTES: usize = 64 * 1024 * 1024;
/// Read buffer size for object bodies.
const READ_CHUNK_BYTES: usize = 8192;

// ============================================================================
// SECTION: Config
// ============================================================================

/// S3-compatible bucket settings.
///
/// # Invariants
/// - `bucket` is non-empty.
/// - `endpoint`, when set, uses `https://` unless `allow_http` is set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3PayloadConfig {
    /// Bucket holding payload objects.
    pub bucket: String,
    /// Region override; defaults to the environment.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Use path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
    /// Permit `http://` endpoints.
    #[serde(default)]
    pub allow_http: bool,
    /// Largest object accepted on read.
    #[serde(default = "default_max_object_bytes")]
    pub max_object_bytes: usize,
}

impl S3PayloadConfig {
    /// Creates a config for `bucket` with environment defaults.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            prefix: None,
            force_path_style: false,
            allow_http: false,
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
        }
    }

    /// Validates bucket, endpoint, and prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] when a setting is unusable.
    pub fn validate(&self) -> Result<(), ObjectStoreError> {
        if self.bucket.trim().is_empty() {
            return Err(ObjectStoreError::Invalid("bucket must be set".to_string()));
        }
        if let Some(endpoint) = &self.endpoint {
            let trimmed = endpoint.trim();
            if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
                return Err(ObjectStoreError::Invalid("endpoint must include http:// or https://".to_string()));
            }
            if trimmed.starts_with("http://") && !self.allow_http {
                return Err(ObjectStoreError::Invalid("endpoint uses http:// without allow_http".to_string()));
            }
        }
        if self.max_object_bytes == 0 {
            return Err(ObjectStoreError::Invalid("max_object_bytes must be greater than zero".to_string()));
        }
        normalize_prefix(self.prefix.as_deref().unwrap_or(""))?;
        Ok(())
    }
}

/// Returns the default object read limit.
const fn default_max_object_bytes() -> usize {
    DEFAULT_MAX_OBJECT_BYTES
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Payload driver over one S3 bucket.
#[derive(Debug, Clone)]
pub struct S3PayloadDriver {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Normalized key prefix.
    prefix: String,
    /// Read limit per object.
    max_object_bytes: usize,
}

impl S3PayloadDriver {
    /// Loads AWS settings from the environment plus `config` and builds
    /// the driver.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] when `config` fails validation.
    pub async fn connect(config: &S3PayloadConfig) -> Result<Self, ObjectStoreError> {
        config.validate()?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = config.endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        Self::from_client(Client::from_conf(s3_builder.build()), config)
    }

    /// Builds the driver around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] when the prefix is invalid.
    pub fn from_client(client: Client, config: &S3PayloadConfig) -> Result<Self, ObjectStoreError> {
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: normalize_prefix(config.prefix.as_deref().unwrap_or(""))?,
            max_object_bytes: config.max_object_bytes,
        })
    }

    /// Returns the object name for a payload key.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] for invalid keys.
    pub fn object_key(&self, key: &str) -> Result<String, ObjectStoreError> {
        key_segments(key)?;
        Ok(format!("{}{key}", self.prefix))
    }

    /// Writes one object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        let object_key = self.object_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(())
    }

    /// Reads one object, returning `None` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        let object_key = self.object_key(key)?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&object_key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(GetObjectError::is_no_such_key) => return Ok(None),
            Err(err) => return Err(ObjectStoreError::Backend(err.to_string())),
        };
        if let Some(length) = output.content_length() {
            let actual_bytes = usize::try_from(length).unwrap_or(usize::MAX);
            if actual_bytes > self.max_object_bytes {
                return Err(ObjectStoreError::TooLarge {
                    key: object_key,
                    max_bytes: self.max_object_bytes,
                    actual_bytes,
                });
            }
        }
        let mut reader = output.body.into_async_read();
        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            let read = reader.read(&mut chunk).await.map_err(|err| ObjectStoreError::Io(err.to_string()))?;
            if read == 0 {
                break;
            }
            if buffer.len() + read > self.max_object_bytes {
                return Err(ObjectStoreError::TooLarge {
                    key: object_key,
                    max_bytes: self.max_object_bytes,
                    actual_bytes: buffer.len() + read,
                });
            }
            buffer.extend_from_slice(&chunk[.. read]);
        }
        Ok(Some(buffer))
    }

    /// Deletes one object; missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let object_key = self.object_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PayloadDriver for S3PayloadDriver {
    async fn mset_item_data(&self, entries: &[PayloadEntry]) -> Result<(), PayloadError> {
        for entry in entries {
            self.put(&entry.key, entry.bytes.clone()).await?;
        }
        Ok(())
    }

    async fn mget_item_data(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, PayloadError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn delete_item_data(&self, keys: &[String]) -> Result<(), PayloadError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    fn offline_driver(prefix: Option<&str>) -> S3PayloadDriver {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        let mut config = S3PayloadConfig::new("payloads");
        config.prefix = prefix.map(ToString::to_string);
        S3PayloadDriver::from_client(Client::from_conf(conf), &config).unwrap()
    }

    #[test]
    fn object_keys_carry_the_prefix() {
        let driver = offline_driver(Some("tenant-a/items"));
        assert_eq!(driver.object_key("dataset:1:item:2:vn:1").unwrap(), "tenant-a/items/dataset:1:item:2:vn:1");
        assert!(driver.object_key("dataset:../x").is_err());
        assert_eq!(offline_driver(None).object_key("k").unwrap(), "k");
    }

    #[test]
    fn validate_rejects_unsafe_settings() {
        let mut config = S3PayloadConfig::new(" ");
        assert!(config.validate().is_err());
        config.bucket = "payloads".to_string();
        config.endpoint = Some("http://localhost:9000".to_string());
        assert!(config.validate().is_err());
        config.allow_http = true;
        assert!(config.validate().is_ok());
        config.endpoint = Some("localhost:9000".to_string());
        assert!(config.validate().is_err());
        config.endpoint = None;
        config.prefix = Some("/root".to_string());
        assert!(config.validate().is_err());
    }
}
