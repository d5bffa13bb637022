//! Coarse named leases over rollup categories.
//!
//! Every writer of a rollup table family runs under that family's
//! lease, so overlapping jobs (daily refresh, backfill, pruning)
//! serialize instead of interleaving deletes and inserts. Leases are
//! deliberately coarse (one per category, never per row) and never
//! nested: a routine acquires exactly one lease at a time, which rules
//! out deadlock by construction. Contention is back-pressure, not an
//! error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct LeaseCoordinator {
    leases: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LeaseCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lease(&self, category: &str) -> Arc<Mutex<()>> {
        let mut leases =
            self.leases.lock().expect("lease registry poisoned");
        Arc::clone(leases.entry(category.to_string()).or_default())
    }

    /// Run `fut` while holding the exclusive lease for `category`.
    ///
    /// A second caller for the same category blocks until release. The
    /// lease is released when the guard goes out of scope, on success
    /// and error paths alike.
    pub async fn with_lease<F, T>(&self, category: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lease = self.lease(category);
        let _held = lease.lock().await;
        tracing::trace!(category, "lease acquired");
        fut.await
    }
}
