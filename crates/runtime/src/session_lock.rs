use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-session advisory lock sequentializing turns within one session.
/// Taken at step 1, released after step 8 (never held across step 9).
/// Scoped to this process instance, matching the rate limiter's
/// documented single-instance scope — true cluster-wide serialization
/// would need a database-held advisory lock instead.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("session lock table poisoned");
            locks.entry(session_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_requests_on_same_session_serialize() {
        let locks = Arc::new(SessionLocks::new());
        let session_id = Uuid::new_v4();
        let order = Arc::new(Mutex::new(Vec::new()));

        let l1 = locks.clone();
        let o1 = order.clone();
        let t1 = tokio::spawn(async move {
            let _guard = l1.acquire(session_id).await;
            o1.lock().unwrap().push(1);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            o1.lock().unwrap().push(2);
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let l2 = locks.clone();
        let o2 = order.clone();
        let t2 = tokio::spawn(async move {
            let _guard = l2.acquire(session_id).await;
            o2.lock().unwrap().push(3);
        });

        t1.await.unwrap();
        t2.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn different_sessions_do_not_block_each_other() {
        let locks = SessionLocks::new();
        let a = locks.acquire(Uuid::new_v4()).await;
        let b = locks.acquire(Uuid::new_v4()).await;
        drop(a);
        drop(b);
    }
}
