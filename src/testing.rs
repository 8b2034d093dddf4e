//! In-memory row source and object sink used by unit tests.

use crate::domains::history::{ApiCallRecord, RowSource, User};
use crate::domains::storage::ObjectSink;
use crate::errors::{DbError, DbResult, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Tracks how many calls are running at once and the highest value seen
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MemoryRowSource {
    users: Vec<User>,
    calls: HashMap<i64, Vec<ApiCallRecord>>,
    fail_list_users: bool,
    failing_users: HashSet<i64>,
    query_delay: Option<Duration>,
    queried: Mutex<Vec<i64>>,
    pub in_flight: InFlight,
}

impl MemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User, calls: Vec<ApiCallRecord>) -> Self {
        self.calls.insert(user.id, calls);
        self.users.push(user);
        self
    }

    pub fn failing_list_users(mut self) -> Self {
        self.fail_list_users = true;
        self
    }

    pub fn failing_user(mut self, user_id: i64) -> Self {
        self.failing_users.insert(user_id);
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// User ids whose history was queried, in call order
    pub fn queried(&self) -> Vec<i64> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn list_users(&self) -> DbResult<Vec<User>> {
        if self.fail_list_users {
            return Err(DbError::Query("relation \"user\" does not exist".to_string()));
        }
        Ok(self.users.clone())
    }

    async fn list_api_calls(&self, user_id: i64) -> DbResult<Vec<ApiCallRecord>> {
        self.queried.lock().unwrap().push(user_id);
        self.in_flight.enter();
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.exit();

        if self.failing_users.contains(&user_id) {
            return Err(DbError::Query(format!("simulated fault for user {}", user_id)));
        }
        Ok(self.calls.get(&user_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryObjectSink {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    failing_keys: Mutex<HashSet<String>>,
    transient_failures: AtomicU32,
    attempts: AtomicUsize,
}

impl MemoryObjectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every put for `key` fails permanently
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    /// The next `count` puts fail with a transient error
    pub fn fail_next_transient(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    pub fn put_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectSink for MemoryObjectSink {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> StorageResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let transient = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient || self.failing_keys.lock().unwrap().contains(key) {
            return Err(StorageError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "simulated upload failure".to_string(),
                transient,
            });
        }

        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}
