//! Background rebuild scheduling (spec.md §4.6).
//!
//! Runs on rayon's global thread pool rather than a hand-rolled worker pool —
//! the index family's own `build` calls are the only CPU-heavy work here, and
//! rayon already gives us a bounded, shared pool without inventing a channel
//! + thread-pool type from scratch.

use std::sync::Arc;

use crate::cancel::ExecutionGuard;
use crate::collection::IndexType;
use crate::ids::RecordId;
use crate::index::{new_index, LshConfig};
use crate::registry::CollectionEntry;

/// Schedules a rebuild for `entry`, coalescing with any rebuild already in
/// flight. Returns `true` if this call is the one that scheduled a new task.
/// `lsh_config` is only meaningful for `IndexType::Lsh`; pass `None` to
/// reuse whatever config the collection last built with (or the default if
/// it has never built an LSH index). `guard` is checked between rebuild
/// phases (spec.md §5); a cancelled or expired guard leaves the installed
/// index untouched.
pub fn schedule_rebuild(entry: Arc<CollectionEntry>, index_type: IndexType, lsh_config: Option<LshConfig>, guard: ExecutionGuard) -> bool {
    if !entry.try_begin_rebuild() {
        return false;
    }
    tracing::info!(?index_type, "rebuild scheduled");
    rayon::spawn(move || run_rebuild(entry, index_type, lsh_config, guard));
    true
}

/// Snapshot-under-read-lock, build-off-lock, install-under-write-lock, per
/// spec.md §4.6. If the data version advanced past what was snapshotted, the
/// new index still installs (its coverage is a strict subset of current data
/// but every entry in it is still correct), then another round runs
/// immediately rather than being re-enqueued through the scheduler again.
///
/// `guard` is polled before the snapshot, after the snapshot, and after the
/// build completes. Tripping it at any point aborts the rebuild without
/// installing anything and without looping for a superseded retry.
fn run_rebuild(entry: Arc<CollectionEntry>, index_type: IndexType, lsh_config: Option<LshConfig>, guard: ExecutionGuard) {
    loop {
        if let Err(err) = guard.check() {
            tracing::warn!(?index_type, error = %err, "rebuild cancelled before snapshot");
            break;
        }

        let (snapshot, dimension, observed_version, lsh_config): (Vec<(RecordId, Vec<f32>)>, usize, u64, Option<LshConfig>) = {
            let state = entry.state.read();
            let snapshot = state
                .records
                .iter()
                .map(|(id, record)| (*id, record.embedding.clone()))
                .collect();
            let lsh_config = lsh_config.or(state.lsh_config);
            (snapshot, state.collection.dimension, state.versions.data_version(), lsh_config)
        };

        if let Err(err) = guard.check() {
            tracing::warn!(?index_type, error = %err, "rebuild cancelled after snapshot");
            break;
        }

        let mut index = new_index(index_type, dimension, lsh_config);
        let build_result = index.build(&snapshot);

        if let Err(err) = guard.check() {
            tracing::warn!(?index_type, error = %err, "rebuild cancelled before install, discarding built index");
            break;
        }

        let superseded = {
            let mut state = entry.state.write();
            match build_result {
                Ok(()) => {
                    let superseded = state.versions.data_version() > observed_version;
                    state.installed_index = Some(index);
                    state.versions.install_index(index_type, observed_version);
                    state.versions.clear_rebuild_error();
                    if index_type == IndexType::Lsh {
                        state.lsh_config = lsh_config;
                    }
                    if superseded {
                        tracing::info!(?index_type, observed_version, "rebuild superseded, rebuilding again");
                    } else {
                        tracing::info!(?index_type, observed_version, "rebuild finished");
                    }
                    superseded
                }
                Err(err) => {
                    tracing::warn!(?index_type, error = %err, "rebuild failed");
                    state.versions.record_rebuild_error(err.to_string());
                    false
                }
            }
        };

        if !superseded {
            break;
        }
    }
    entry.finish_rebuild();
}
