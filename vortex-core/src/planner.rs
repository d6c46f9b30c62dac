//! The query planner (spec.md §4.5): picks served-from-index,
//! filtered-brute-force, or stale-with-fallback execution, and always
//! returns results already sorted and ready to hand back to the caller.

use serde::Serialize;

use crate::cancel::ExecutionGuard;
use crate::collection::IndexType;
use crate::error::{Error, Result};
use crate::filter::MetadataFilter;
use crate::ids::{GroupId, RecordId};
use crate::metadata::Metadata;
use crate::registry::CollectionState;
use crate::vecmath::{cosine_similarity, TopK};

/// Checked every `GUARD_CHECK_INTERVAL` candidates during a brute-force scan
/// — coarse granularity, per spec.md §5, not a per-item check.
const GUARD_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone)]
pub struct QueryParams {
    pub query: Vec<f32>,
    pub k: usize,
    pub filter: MetadataFilter,
    pub allow_stale: bool,
    pub use_fallback_on_stale: bool,
    pub guard: ExecutionGuard,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub id: RecordId,
    pub score: f32,
    pub group_id: GroupId,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub hits: Vec<Hit>,
    pub stale_index: bool,
    pub index_type_used: Option<IndexType>,
    pub considered_count: usize,
}

/// Runs the decision table against `state`. Returns the result and whether
/// the caller should schedule a background rebuild afterwards — this
/// function never schedules one itself; it only observes versions.
pub fn plan_and_execute(state: &CollectionState, params: &QueryParams) -> Result<(QueryResult, bool)> {
    if params.k == 0 {
        return Err(Error::InvalidArgument("k must be >= 1".into()));
    }
    if params.query.len() != state.collection.dimension {
        return Err(Error::DimensionMismatch {
            expected: state.collection.dimension,
            got: params.query.len(),
        });
    }

    if !params.filter.is_empty() {
        tracing::debug!("planner: filtered brute-force");
        return Ok((filtered_brute_force(state, params)?, false));
    }

    if state.installed_index.is_none() {
        tracing::debug!("planner: no index installed, flat scan");
        return Ok((flat_scan(state, params)?, false));
    }

    let stale = state.versions.is_stale();
    if !stale {
        tracing::debug!("planner: serving from fresh index");
        return Ok((serve_from_index(state, params, false)?, false));
    }

    if params.allow_stale {
        tracing::debug!("planner: serving from stale index, allow_stale set");
        return Ok((serve_from_index(state, params, true)?, true));
    }
    if params.use_fallback_on_stale {
        tracing::debug!("planner: index stale, falling back to flat scan");
        return Ok((flat_scan(state, params)?, true));
    }
    Err(Error::IndexStale)
}

fn serve_from_index(state: &CollectionState, params: &QueryParams, stale_index: bool) -> Result<QueryResult> {
    params.guard.check()?;
    let index = state.installed_index.as_ref().expect("checked by caller");
    let raw_hits = index.search(&params.query, params.k)?;
    let considered_count = index.size();
    let index_type_used = state.versions.installed_index_type();

    let hits = raw_hits
        .into_iter()
        .filter_map(|hit| state.records.get(&hit.id).map(|record| Hit {
            id: hit.id,
            score: hit.similarity,
            group_id: record.group_id,
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        }))
        .collect();

    Ok(QueryResult {
        hits,
        stale_index,
        index_type_used,
        considered_count,
    })
}

fn flat_scan(state: &CollectionState, params: &QueryParams) -> Result<QueryResult> {
    let mut topk: TopK<RecordId> = TopK::new(params.k);
    for (i, record) in state.records.values().enumerate() {
        if i % GUARD_CHECK_INTERVAL == 0 {
            params.guard.check()?;
        }
        topk.push(record.id, cosine_similarity(&params.query, &record.embedding));
    }

    let hits = topk
        .into_sorted_vec()
        .into_iter()
        .filter_map(|scored| state.records.get(&scored.id).map(|record| Hit {
            id: scored.id,
            score: scored.similarity,
            group_id: record.group_id,
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        }))
        .collect();

    Ok(QueryResult {
        hits,
        stale_index: false,
        index_type_used: None,
        considered_count: state.records.len(),
    })
}

fn filtered_brute_force(state: &CollectionState, params: &QueryParams) -> Result<QueryResult> {
    let candidate_surrogates = state.bitmap.candidates(&params.filter);
    let mut topk: TopK<RecordId> = TopK::new(params.k);
    let mut considered_count = 0usize;

    let mut scan = |record: &crate::record::Record, i: usize| -> Result<()> {
        if i % GUARD_CHECK_INTERVAL == 0 {
            params.guard.check()?;
        }
        if params.filter.matches(record) {
            topk.push(record.id, cosine_similarity(&params.query, &record.embedding));
        }
        Ok(())
    };

    match candidate_surrogates {
        Some(bitmap) => {
            for (i, surrogate) in bitmap.iter().enumerate() {
                let Some(id) = state.bitmap.record_id(surrogate) else {
                    continue;
                };
                let Some(record) = state.records.get(&id) else {
                    continue;
                };
                scan(record, i)?;
                considered_count += 1;
            }
        }
        None => {
            for (i, record) in state.records.values().enumerate() {
                scan(record, i)?;
                considered_count += 1;
            }
        }
    }

    let hits = topk
        .into_sorted_vec()
        .into_iter()
        .filter_map(|scored| state.records.get(&scored.id).map(|record| Hit {
            id: scored.id,
            score: scored.similarity,
            group_id: record.group_id,
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        }))
        .collect();

    Ok(QueryResult {
        hits,
        stale_index: false,
        index_type_used: None,
        considered_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use crate::index::new_index;
    use crate::record::Record;

    fn params(query: Vec<f32>, k: usize) -> QueryParams {
        QueryParams {
            query,
            k,
            filter: MetadataFilter::default(),
            allow_stale: false,
            use_fallback_on_stale: true,
            guard: ExecutionGuard::none(),
        }
    }

    fn seeded_state(dimension: usize) -> (CollectionState, Vec<RecordId>) {
        let collection = Collection::new("test".into(), dimension, IndexType::Flat, Metadata::new());
        let mut state = CollectionState::new(collection);
        let group_id = crate::ids::new_id();
        let mut ids = Vec::new();
        for (text, v) in [("a", vec![1.0, 0.0, 0.0]), ("b", vec![0.0, 1.0, 0.0]), ("c", vec![0.0, 0.0, 1.0])] {
            let record = Record::new(state.collection.id, group_id, text.into(), v, Metadata::new());
            ids.push(record.id);
            state.bitmap.insert(&record);
            state.records.insert(record.id, record);
        }
        (state, ids)
    }

    #[test]
    fn test_no_index_falls_back_to_flat_scan() {
        let (state, ids) = seeded_state(3);
        let (result, schedule) = plan_and_execute(&state, &params(vec![1.0, 0.0, 0.0], 1)).unwrap();
        assert!(!schedule);
        assert_eq!(result.hits[0].id, ids[0]);
        assert_eq!(result.index_type_used, None);
    }

    #[test]
    fn test_fresh_index_serves_from_index() {
        let (mut state, ids) = seeded_state(3);
        let snapshot: Vec<_> = state.records.iter().map(|(id, r)| (*id, r.embedding.clone())).collect();
        let mut index = new_index(IndexType::Flat, 3, None);
        index.build(&snapshot).unwrap();
        state.installed_index = Some(index);
        state.versions.install_index(IndexType::Flat, state.versions.data_version());

        let (result, schedule) = plan_and_execute(&state, &params(vec![1.0, 0.0, 0.0], 1)).unwrap();
        assert!(!schedule);
        assert!(!result.stale_index);
        assert_eq!(result.index_type_used, Some(IndexType::Flat));
        assert_eq!(result.hits[0].id, ids[0]);
    }

    #[test]
    fn test_stale_without_fallback_or_allow_errors() {
        let (mut state, _) = seeded_state(3);
        let mut index = new_index(IndexType::Flat, 3, None);
        index.build(&[]).unwrap();
        state.installed_index = Some(index);
        state.versions.install_index(IndexType::Flat, 0);
        state.versions.bump_data_version();

        let mut p = params(vec![1.0, 0.0, 0.0], 1);
        p.allow_stale = false;
        p.use_fallback_on_stale = false;
        let err = plan_and_execute(&state, &p).unwrap_err();
        assert!(matches!(err, Error::IndexStale));
    }

    #[test]
    fn test_stale_with_fallback_schedules_rebuild_and_scans() {
        let (mut state, ids) = seeded_state(3);
        let mut index = new_index(IndexType::Flat, 3, None);
        index.build(&[]).unwrap();
        state.installed_index = Some(index);
        state.versions.install_index(IndexType::Flat, 0);
        state.versions.bump_data_version();

        let mut p = params(vec![1.0, 0.0, 0.0], 1);
        p.allow_stale = false;
        p.use_fallback_on_stale = true;
        let (result, schedule) = plan_and_execute(&state, &p).unwrap();
        assert!(schedule);
        assert_eq!(result.hits[0].id, ids[0]);
    }

    #[test]
    fn test_stale_with_allow_stale_serves_flagged() {
        let (mut state, ids) = seeded_state(3);
        let mut index = new_index(IndexType::Flat, 3, None);
        index.build(&[(ids[0], vec![1.0, 0.0, 0.0])]).unwrap();
        state.installed_index = Some(index);
        state.versions.install_index(IndexType::Flat, 0);
        state.versions.bump_data_version();

        let mut p = params(vec![1.0, 0.0, 0.0], 1);
        p.allow_stale = true;
        let (result, schedule) = plan_and_execute(&state, &p).unwrap();
        assert!(schedule);
        assert!(result.stale_index);
    }

    #[test]
    fn test_nonempty_filter_forces_brute_force_even_with_index() {
        let (mut state, ids) = seeded_state(3);
        let snapshot: Vec<_> = state.records.iter().map(|(id, r)| (*id, r.embedding.clone())).collect();
        let mut index = new_index(IndexType::KdTree, 3, None);
        index.build(&snapshot).unwrap();
        state.installed_index = Some(index);
        state.versions.install_index(IndexType::KdTree, state.versions.data_version());

        let mut p = params(vec![1.0, 0.0, 0.0], 5);
        p.filter.text_contains = Some("a".to_string());
        let (result, _) = plan_and_execute(&state, &p).unwrap();
        assert_eq!(result.index_type_used, None);
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].id, ids[0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (state, _) = seeded_state(3);
        let err = plan_and_execute(&state, &params(vec![1.0, 0.0], 1)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_cancelled_guard_aborts_serve_from_index() {
        use crate::cancel::CancellationToken;

        let (mut state, _) = seeded_state(3);
        let snapshot: Vec<_> = state.records.iter().map(|(id, r)| (*id, r.embedding.clone())).collect();
        let mut index = new_index(IndexType::Flat, 3, None);
        index.build(&snapshot).unwrap();
        state.installed_index = Some(index);
        state.versions.install_index(IndexType::Flat, state.versions.data_version());

        let token = CancellationToken::new();
        token.cancel();
        let mut p = params(vec![1.0, 0.0, 0.0], 1);
        p.guard = ExecutionGuard {
            token: Some(token),
            deadline: None,
        };

        let err = plan_and_execute(&state, &p).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
