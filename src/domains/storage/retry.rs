use crate::domains::storage::object_sink::ObjectSink;
use crate::errors::StorageResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy for transient storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one; 0 disables retrying
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Wraps an `ObjectSink` and retries transient failures with exponential backoff.
///
/// Permanent failures are returned immediately.
pub struct RetryingObjectSink {
    inner: Arc<dyn ObjectSink>,
    policy: RetryPolicy,
}

impl RetryingObjectSink {
    pub fn new(inner: Arc<dyn ObjectSink>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ObjectSink for RetryingObjectSink {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StorageResult<()> {
        let mut retry = 0;
        loop {
            match self.inner.put_object(bucket, key, body.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retry);
                    log::warn!(
                        "Transient error uploading {}/{} (retry {} of {} in {:?}): {}",
                        bucket,
                        key,
                        retry + 1,
                        self.policy.max_retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::testing::MemoryObjectSink;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = Arc::new(MemoryObjectSink::new());
        inner.fail_next_transient(2);
        let sink = RetryingObjectSink::new(inner.clone(), fast_policy(3));

        sink.put_object("user-history", "user_1_ann.csv", b"x".to_vec())
            .await
            .unwrap();

        assert_eq!(inner.put_attempts(), 3);
        assert_eq!(inner.get("user-history", "user_1_ann.csv"), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(MemoryObjectSink::new());
        inner.fail_next_transient(5);
        let sink = RetryingObjectSink::new(inner.clone(), fast_policy(2));

        let err = sink
            .put_object("user-history", "user_1_ann.csv", Vec::new())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(inner.put_attempts(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let inner = Arc::new(MemoryObjectSink::new());
        inner.fail_key("user_1_ann.csv");
        let sink = RetryingObjectSink::new(inner.clone(), fast_policy(3));

        let err = sink
            .put_object("user-history", "user_1_ann.csv", Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend { transient: false, .. }));
        assert_eq!(inner.put_attempts(), 1);
    }

    #[tokio::test]
    async fn test_default_policy_makes_single_attempt() {
        let inner = Arc::new(MemoryObjectSink::new());
        inner.fail_next_transient(1);
        let sink = RetryingObjectSink::new(inner.clone(), RetryPolicy::default());

        assert!(sink.put_object("b", "k", Vec::new()).await.is_err());
        assert_eq!(inner.put_attempts(), 1);
    }
}
