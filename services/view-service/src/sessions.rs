use sha2::{Digest, Sha256};
use std::{collections::HashMap, time::SystemTime};
use tokio::sync::Mutex;

/// Hex SHA-256 of `"{ip}-{user_agent}"`. Shared proxies and browsers collide,
/// so this is only a soft key for recognising a returning viewer.
pub fn fingerprint_of(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{ip}-{user_agent}").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Debug)]
pub struct Assignment {
    pub identity: String,
    pub fingerprint: String,
    pub assigned_at: SystemTime,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    by_identity: HashMap<String, Assignment>,
    next_seq: u64,
}

/// Remote identity -> client fingerprint, kept for the life of the process.
///
/// Every call takes the lock on its own. A `lookup` followed by an `assign`
/// is not atomic, so two requests from one client can both miss and lease
/// two identities; the hub's pool absorbs the extra lease.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity currently assigned to `fingerprint`. When a race left several
    /// identities on the same fingerprint, the latest assignment wins.
    pub async fn lookup(&self, fingerprint: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .by_identity
            .values()
            .filter(|assignment| assignment.fingerprint == fingerprint)
            .max_by_key(|assignment| assignment.seq)
            .map(|assignment| assignment.identity.clone())
    }

    /// Records `identity -> fingerprint`, replacing whatever the identity had.
    pub async fn assign(&self, identity: &str, fingerprint: &str) {
        let mut inner = self.inner.lock().await;
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let previous = inner.by_identity.insert(
            identity.to_string(),
            Assignment {
                identity: identity.to_string(),
                fingerprint: fingerprint.to_string(),
                assigned_at: SystemTime::now(),
                seq,
            },
        );
        if let Some(previous) = previous {
            if previous.fingerprint != fingerprint {
                tracing::warn!(identity, "session assignment overwritten");
            }
        }
    }

    /// Returns whether an assignment was removed.
    pub async fn release(&self, identity: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.by_identity.remove(identity).is_some()
    }

    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let dropped = inner.by_identity.len();
        inner.by_identity.clear();
        dropped
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_identity.len()
    }

    /// Assignments ordered oldest first.
    pub async fn snapshot(&self) -> Vec<Assignment> {
        let inner = self.inner.lock().await;
        let mut assignments: Vec<Assignment> = inner.by_identity.values().cloned().collect();
        assignments.sort_by_key(|assignment| assignment.seq);
        assignments
    }
}
