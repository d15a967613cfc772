//! Object-store access behind a trait so the pipeline can be exercised
//! without AWS.

use aws_sdk_s3::operation::get_object::GetObjectError;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// Deadline on a single object fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum FetchError {
    /// The object is gone or unreadable; the notification will never
    /// succeed.
    NotFound(String),
    AccessDenied(String),
    /// Network or service trouble; the notification should redeliver.
    Transient(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::NotFound(e) => write!(f, "object not found: {}", e),
            FetchError::AccessDenied(e) => write!(f, "access denied: {}", e),
            FetchError::Transient(e) => write!(f, "transient fetch error: {}", e),
        }
    }
}

impl FetchError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound(_) | FetchError::AccessDenied(_))
    }
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError>;
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        let call = self.client.get_object().bucket(bucket).key(key).send();
        let response = match tokio::time::timeout(FETCH_TIMEOUT, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(map_sdk_error(e)),
            Err(_) => {
                return Err(FetchError::Transient(format!(
                    "object fetch timed out after {:?}",
                    FETCH_TIMEOUT
                )))
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| FetchError::Transient(format!("body read failed: {e}")))?;
        let bytes = body.into_bytes();
        debug!(bucket, key, size = bytes.len(), "object fetched");
        Ok(bytes)
    }
}

fn map_sdk_error(e: aws_sdk_s3::error::SdkError<GetObjectError>) -> FetchError {
    use aws_sdk_s3::error::ProvideErrorMetadata;

    if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = e {
        if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) {
            return FetchError::NotFound(e.to_string());
        }
        match service_err.err().code() {
            Some("AccessDenied") | Some("Forbidden") => {
                return FetchError::AccessDenied(e.to_string())
            }
            Some("NoSuchBucket") => return FetchError::NotFound(e.to_string()),
            _ => {}
        }
    }
    FetchError::Transient(e.to_string())
}
