use crate::domain::sessions::SessionKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-(vehicle, handler) mutual exclusion.
///
/// The duplicate-check-then-insert sequence at check-in and the
/// close-then-move sequence at checkout run under the key's mutex, so racing
/// calls for the same vehicle and handler serialize while different keys
/// never contend. Lock entries are retained once created; the population is
/// bounded by the lot's vehicle/handler turnover.
pub struct KeyedLocks {
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}
