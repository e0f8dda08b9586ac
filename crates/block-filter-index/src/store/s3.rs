use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use bytes::Bytes;
use tokio::time::{Duration, sleep};
use tracing::debug;

use crate::config::RetryPolicy;
use crate::domain::keys::SegmentId;
use crate::error::{Error, Result};
use crate::store::traits::SegmentStore;

/// S3-compatible (MinIO, AWS) segment store. A single PUT publishes the whole
/// object, which gives the atomic-or-absent write the indexer relies on.
#[derive(Clone)]
pub struct S3SegmentStore {
    client: Client,
    bucket: String,
    object_prefix: String,
    retry: RetryPolicy,
}

impl S3SegmentStore {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        object_prefix: &str,
    ) -> Result<Self> {
        let creds = Credentials::new(access_key, secret_key, None, None, "static");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(creds)
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
            object_prefix: normalize_prefix(object_prefix),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn object_key(&self, id: &SegmentId) -> String {
        format!("{}{}", self.object_prefix, id.object_name())
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: core::future::Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= self.retry.max_retries || !is_retryable_backend_error(&e) {
                        return Err(e);
                    }
                    let backoff = compute_backoff_ms(
                        attempt,
                        self.retry.base_delay_ms,
                        self.retry.max_delay_ms,
                    );
                    debug!(target: "index::store", op, attempt, backoff_ms = backoff, error = %e, "retrying s3 operation");
                    sleep(Duration::from_millis(backoff)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SegmentStore for S3SegmentStore {
    async fn exists(&self, id: &SegmentId) -> Result<bool> {
        let object_key = self.object_key(id);
        self.with_retry("exists", || async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&object_key)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(err) => {
                    if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                        Ok(false)
                    } else {
                        Err(Error::Backend(format!("s3 head_object: {err}")))
                    }
                }
            }
        })
        .await
    }

    async fn write(&self, id: &SegmentId, value: Bytes) -> Result<()> {
        let object_key = self.object_key(id);
        let payload = value.to_vec();
        self.with_retry("write", || async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&object_key)
                .body(payload.clone().into())
                .send()
                .await
                .map_err(|e| Error::Backend(format!("s3 put_object: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn open(&self, id: &SegmentId) -> Result<Bytes> {
        let object_key = self.object_key(id);
        self.with_retry("open", || async {
            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&object_key)
                .send()
                .await;

            match resp {
                Ok(resp) => {
                    let aggregated = resp
                        .body
                        .collect()
                        .await
                        .map_err(|e| Error::Backend(format!("s3 read body: {e}")))?;
                    Ok(aggregated.into_bytes())
                }
                Err(err) => {
                    if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                        Err(Error::NotFound)
                    } else {
                        Err(Error::Backend(format!("s3 get_object: {err}")))
                    }
                }
            }
        })
        .await
    }
}

fn compute_backoff_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let factor = 1u64 << core::cmp::min(attempt, 8);
    core::cmp::min(base_ms.saturating_mul(factor), max_ms)
}

fn is_retryable_backend_error(err: &Error) -> bool {
    let Error::Backend(msg) = err else {
        return false;
    };
    let s = msg.to_ascii_lowercase();
    s.contains("timeout")
        || s.contains("temporar")
        || s.contains("connection")
        || s.contains("reset")
        || s.contains("refused")
        || s.contains("unavailable")
        || s.contains("throttl")
        || s.contains("503")
        || s.contains("500")
}

fn normalize_prefix(p: &str) -> String {
    if p.is_empty() || p.ends_with('/') {
        p.to_string()
    } else {
        format!("{p}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        assert_eq!(compute_backoff_ms(0, 25, 1000), 25);
        assert_eq!(compute_backoff_ms(3, 25, 1000), 200);
        assert_eq!(compute_backoff_ms(20, 25, 1000), 1000);
    }

    #[test]
    fn not_found_is_never_retried() {
        assert!(!is_retryable_backend_error(&Error::NotFound));
        assert!(is_retryable_backend_error(&Error::Backend(
            "connection reset by peer".to_string()
        )));
        assert!(!is_retryable_backend_error(&Error::Backend(
            "access denied".to_string()
        )));
    }

    #[test]
    fn prefix_gets_trailing_slash() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("idx"), "idx/");
        assert_eq!(normalize_prefix("idx/"), "idx/");
    }
}
