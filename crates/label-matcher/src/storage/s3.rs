use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::Region,
    error::{DisplayErrorContext, ProvideErrorMetadata},
    Client,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, ObjectLocation, ObjectStore, StorageObject, StoreResult};
use crate::error::StoreError;

/// S3 (or S3-compatible) implementation of [`ObjectStore`].
///
/// Cheap to clone; the underlying client shares one connection pool.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some((access_key, secret_key)) = config.static_keys() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "label-matcher-storage",
            ));
        }
        let shared = loader.load().await;

        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        info!(endpoint = ?config.endpoint, "Storage client initialized");

        Self {
            client: Client::from_conf(s3_config_builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<StorageObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StoreError::List {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                let key = obj.key()?;
                Some(StorageObject {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    filename: label_common::types::base_name(key).to_string(),
                    size_bytes: obj.size().unwrap_or(0),
                    last_modified: obj
                        .last_modified()
                        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())),
                })
            }));

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} objects in s3://{}/{}", objects.len(), bucket, prefix);

        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn read(&self, location: &ObjectLocation) -> StoreResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StoreError::NotFound {
                        bucket: location.bucket.clone(),
                        key: location.key.clone(),
                    }
                } else {
                    StoreError::Read {
                        bucket: location.bucket.clone(),
                        key: location.key.clone(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Read {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                message: e.to_string(),
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from {}", data.len(), location);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn copy(&self, source: &ObjectLocation, dest_key: &str) -> StoreResult<()> {
        let copy_source = format!("{}/{}", source.bucket, encode_key(&source.key));

        self.client
            .copy_object()
            .bucket(&source.bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .and_then(|se| se.code())
                    .is_some_and(|code| code == "NoSuchKey");
                if missing {
                    StoreError::NotFound {
                        bucket: source.bucket.clone(),
                        key: source.key.clone(),
                    }
                } else {
                    StoreError::Copy {
                        bucket: source.bucket.clone(),
                        source_key: source.key.clone(),
                        dest_key: dest_key.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        debug!("Copied {} to {}", source, dest_key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, location: &ObjectLocation) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| StoreError::Delete {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!("Deleted {}", location);

        Ok(())
    }
}

/// Percent-encode each path segment of a key for the `x-amz-copy-source` header
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
