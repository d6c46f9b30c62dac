//! A minimal replication follower: periodically pulls a collection's
//! snapshot from an upstream `VectorDb` and replays it locally.
//!
//! This is the narrow contract spec.md §6 describes for the replication
//! collaborator — no consensus, no conflict resolution, last snapshot wins.
//!
//! `main.rs` does not spin one of these up by default: wiring a real one
//! requires an actual upstream process to poll, which is a transport
//! decision (HTTP client, another queue, whatever) outside this crate's
//! scope. It is exercised directly by its own test and is here for an
//! embedder to construct once they have two `VectorDb`s to connect.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use vortex_core::{CollectionId, VectorDb};

pub struct ReplicaFollower {
    upstream: Arc<VectorDb>,
    local: Arc<VectorDb>,
    collection_id: CollectionId,
    poll_interval: Duration,
}

impl ReplicaFollower {
    pub fn new(upstream: Arc<VectorDb>, local: Arc<VectorDb>, collection_id: CollectionId, poll_interval: Duration) -> Self {
        Self {
            upstream,
            local,
            collection_id,
            poll_interval,
        }
    }

    /// Spawns the polling loop on the current tokio runtime. Runs until the
    /// process exits; no shutdown signal is wired since this is a demo
    /// stub, not a production follower.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            loop {
                ticker.tick().await;
                match self.upstream.export_snapshot(self.collection_id) {
                    Ok(snapshot) => {
                        if let Err(err) = self.local.import_snapshot(snapshot) {
                            tracing::warn!(error = %err, "replica import failed");
                        } else {
                            tracing::debug!(collection_id = %self.collection_id, "replica synced");
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "replica export failed"),
                }
            }
        })
    }
}
