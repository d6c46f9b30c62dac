//! HTTP routes over `vortex-core`'s external interface (spec.md §6). Every
//! handler does request parsing and response shaping only; all domain logic
//! lives in `VectorDb`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vortex_core::cancel::{CancellationToken, Deadline, ExecutionGuard};
use vortex_core::{
    CollectionId, GroupId, IndexType, LshConfig, Metadata, MetadataFilter, QueryParams, RecordId, VectorDb,
};

use crate::config::ServerConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<VectorDb>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub config: Arc<ServerConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/collections", post(create_collection).get(list_collections))
        .route(
            "/collections/:collection_id",
            get(get_collection).patch(update_collection).delete(delete_collection),
        )
        .route("/collections/:collection_id/groups", post(create_group).get(list_groups))
        .route(
            "/collections/:collection_id/groups/:group_id",
            get(get_group).patch(update_group).delete(delete_group),
        )
        .route("/collections/:collection_id/records", post(insert_record).get(list_records))
        .route(
            "/collections/:collection_id/records/:record_id",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .route("/collections/:collection_id/build", post(build_index))
        .route("/collections/:collection_id/status", get(collection_status))
        .route("/collections/:collection_id/query", post(query))
        .route("/collections/:collection_id/snapshot", get(export_snapshot))
        .with_state(state)
}

// ---- collections -----------------------------------------------------------

#[derive(Deserialize)]
struct CreateCollectionRequest {
    name: String,
    dimension: usize,
    #[serde(default)]
    default_index_type: IndexTypeDto,
}

#[derive(Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum IndexTypeDto {
    #[default]
    Flat,
    KdTree,
    Lsh,
}

impl From<IndexTypeDto> for IndexType {
    fn from(dto: IndexTypeDto) -> Self {
        match dto {
            IndexTypeDto::Flat => IndexType::Flat,
            IndexTypeDto::KdTree => IndexType::KdTree,
            IndexTypeDto::Lsh => IndexType::Lsh,
        }
    }
}

async fn create_collection(
    State(state): State<AppState>,
    Json(req): Json<CreateCollectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = state
        .db
        .create_collection(req.name, req.dimension, req.default_index_type.into(), Metadata::new())?;
    Ok((StatusCode::CREATED, Json(id)))
}

async fn list_collections(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.db.list_collections())
}

async fn get_collection(State(state): State<AppState>, Path(collection_id): Path<CollectionId>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.db.get_collection(collection_id)?))
}

#[derive(Deserialize, Default)]
struct UpdateCollectionRequest {
    name: Option<String>,
    default_index_type: Option<IndexTypeDto>,
}

async fn update_collection(
    State(state): State<AppState>,
    Path(collection_id): Path<CollectionId>,
    Json(req): Json<UpdateCollectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patch = vortex_core::CollectionPatch {
        name: req.name,
        default_index_type: req.default_index_type.map(Into::into),
    };
    state.db.update_collection(collection_id, patch)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_collection(State(state): State<AppState>, Path(collection_id): Path<CollectionId>) -> Result<impl IntoResponse, AppError> {
    state.db.delete_collection(collection_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- groups -----------------------------------------------------------------

#[derive(Deserialize)]
struct CreateGroupRequest {
    title: String,
}

async fn create_group(
    State(state): State<AppState>,
    Path(collection_id): Path<CollectionId>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.db.create_group(collection_id, req.title, Metadata::new())?;
    Ok((StatusCode::CREATED, Json(id)))
}

async fn list_groups(State(state): State<AppState>, Path(collection_id): Path<CollectionId>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.db.list_groups(collection_id)?))
}

async fn get_group(
    State(state): State<AppState>,
    Path((collection_id, group_id)): Path<(CollectionId, GroupId)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.db.get_group(collection_id, group_id)?))
}

#[derive(Deserialize, Default)]
struct UpdateGroupRequest {
    title: Option<String>,
    author: Option<Option<String>>,
    tags: Option<BTreeSet<String>>,
}

async fn update_group(
    State(state): State<AppState>,
    Path((collection_id, group_id)): Path<(CollectionId, GroupId)>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patch = vortex_core::GroupPatch {
        title: req.title,
        author: req.author,
        tags: req.tags,
        source: None,
    };
    state.db.update_group(collection_id, group_id, patch)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_group(
    State(state): State<AppState>,
    Path((collection_id, group_id)): Path<(CollectionId, GroupId)>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_group(collection_id, group_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- records ------------------------------------------------------------

#[derive(Deserialize)]
struct InsertRecordRequest {
    group_id: GroupId,
    text: String,
    /// Either pass a vector directly, or omit it and let the configured
    /// `EmbeddingProvider` derive one from `text`.
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

async fn insert_record(
    State(state): State<AppState>,
    Path(collection_id): Path<CollectionId>,
    Json(req): Json<InsertRecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let embedding = match req.embedding {
        Some(v) => v,
        None => state.embedder.embed(&req.text)?,
    };
    let id = state
        .db
        .insert_record(collection_id, req.group_id, req.text, embedding, Metadata::new())?;
    Ok((StatusCode::CREATED, Json(id)))
}

#[derive(Deserialize, Default)]
struct ListRecordsQuery {
    author: Option<String>,
    group_id: Option<GroupId>,
    text_contains: Option<String>,
}

async fn list_records(
    State(state): State<AppState>,
    Path(collection_id): Path<CollectionId>,
    Query(q): Query<ListRecordsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = MetadataFilter {
        author: q.author,
        group_id: q.group_id,
        text_contains: q.text_contains,
        ..Default::default()
    };
    let filter = if filter.is_empty() { None } else { Some(filter) };
    Ok(Json(state.db.list_records(collection_id, filter)?))
}

async fn get_record(
    State(state): State<AppState>,
    Path((collection_id, record_id)): Path<(CollectionId, RecordId)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.db.get_record(collection_id, record_id)?))
}

#[derive(Deserialize, Default)]
struct UpdateRecordRequest {
    text: Option<String>,
    embedding: Option<Vec<f32>>,
    author: Option<Option<String>>,
    tags: Option<BTreeSet<String>>,
}

async fn update_record(
    State(state): State<AppState>,
    Path((collection_id, record_id)): Path<(CollectionId, RecordId)>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patch = vortex_core::RecordPatch {
        text: req.text,
        embedding: req.embedding,
        author: req.author,
        tags: req.tags,
        source: None,
    };
    state.db.update_record(collection_id, record_id, patch)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_record(
    State(state): State<AppState>,
    Path((collection_id, record_id)): Path<(CollectionId, RecordId)>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_record(collection_id, record_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- index & query --------------------------------------------------------

#[derive(Deserialize, Default)]
struct BuildRequest {
    #[serde(default)]
    index_type: IndexTypeDto,
    lsh_hyperplanes: Option<usize>,
    lsh_tables: Option<usize>,
    lsh_seed: Option<u64>,
    deadline_ms: Option<u64>,
}

async fn build_index(
    State(state): State<AppState>,
    Path(collection_id): Path<CollectionId>,
    Json(req): Json<BuildRequest>,
) -> Result<impl IntoResponse, AppError> {
    let lsh_config = match (req.lsh_hyperplanes, req.lsh_tables, req.lsh_seed) {
        (None, None, None) if req.index_type != IndexTypeDto::Lsh => None,
        (hyperplanes, tables, seed) => {
            let default = LshConfig::default();
            Some(LshConfig {
                num_hyperplanes: hyperplanes.unwrap_or(state.config.default_lsh_hyperplanes),
                num_tables: tables.unwrap_or(state.config.default_lsh_tables),
                seed: seed.unwrap_or(default.seed),
            })
        }
    };
    let guard = ExecutionGuard {
        token: Some(CancellationToken::new()),
        deadline: req.deadline_ms.map(|ms| Deadline::after(Duration::from_millis(ms))),
    };
    let build_id = state.db.build(collection_id, req.index_type.into(), lsh_config, guard)?;
    Ok(Json(build_id))
}

async fn collection_status(State(state): State<AppState>, Path(collection_id): Path<CollectionId>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.db.status(collection_id)?))
}

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    text: Option<String>,
    k: usize,
    #[serde(default)]
    filter: QueryFilterDto,
    #[serde(default)]
    allow_stale: bool,
    #[serde(default = "default_true")]
    use_fallback_on_stale: bool,
    deadline_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Default)]
struct QueryFilterDto {
    tags_any: Option<BTreeSet<String>>,
    tags_all: Option<BTreeSet<String>>,
    author: Option<String>,
    group_id: Option<GroupId>,
    created_from: Option<DateTime<Utc>>,
    created_to: Option<DateTime<Utc>>,
    text_contains: Option<String>,
}

impl From<QueryFilterDto> for MetadataFilter {
    fn from(dto: QueryFilterDto) -> Self {
        Self {
            tags_any: dto.tags_any,
            tags_all: dto.tags_all,
            author: dto.author,
            group_id: dto.group_id,
            created_from: dto.created_from,
            created_to: dto.created_to,
            text_contains: dto.text_contains,
        }
    }
}

async fn query(
    State(state): State<AppState>,
    Path(collection_id): Path<CollectionId>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let vector = match req.vector {
        Some(v) => v,
        None => {
            let text = req
                .text
                .ok_or_else(|| AppError(vortex_core::Error::InvalidArgument("either vector or text is required".into())))?;
            state.embedder.embed(&text)?
        }
    };

    let guard = ExecutionGuard {
        token: Some(CancellationToken::new()),
        deadline: req.deadline_ms.map(|ms| Deadline::after(Duration::from_millis(ms))),
    };

    let params = QueryParams {
        query: vector,
        k: req.k,
        filter: req.filter.into(),
        allow_stale: req.allow_stale,
        use_fallback_on_stale: req.use_fallback_on_stale,
        guard,
    };

    Ok(Json(state.db.query(collection_id, params)?))
}

#[derive(Serialize)]
struct SnapshotResponse {
    collection: vortex_core::Collection,
    groups: Vec<vortex_core::Group>,
    records: Vec<vortex_core::Record>,
}

async fn export_snapshot(State(state): State<AppState>, Path(collection_id): Path<CollectionId>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.db.export_snapshot(collection_id)?;
    Ok(Json(SnapshotResponse {
        collection: snapshot.collection,
        groups: snapshot.groups,
        records: snapshot.records,
    }))
}
