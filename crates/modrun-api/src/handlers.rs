use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use modrun_domain::{AssetId, AssetKind, AssetStatus, ModuleId, TaskId};
use modrun_store::{DocumentStore, ModuleRecord};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Modules ───────────────────────────────────────────────────────────────────

/// Serial, synchronous scan: the response returns once every candidate
/// directory has been processed.
pub async fn scan_modules(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.registry.discover_and_register().await?;
    Ok(Json(json!({ "status": "success", "message": "scan complete" })))
}

fn module_projection(m: &ModuleRecord) -> Value {
    json!({
        "id": m.id,
        "status": m.status,
        "inputs": m.capabilities.inputs,
        "outputs": m.capabilities.outputs,
        "path": m.path,
        "version_hash": m.version_hash,
    })
}

pub async fn list_modules(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let modules = state.store.list_modules().await?;
    let projected: Vec<Value> = modules.iter().map(module_projection).collect();
    Ok(Json(json!(projected)))
}

pub async fn get_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let module = state
        .store
        .get_module(&ModuleId::new(&id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("module '{}' not found", id)))?;
    Ok(Json(module_projection(&module)))
}

// ── Assets ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub source_path: PathBuf,
    pub label: Option<String>,
    pub media_type: Option<String>,
}

pub async fn ingest_asset(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<Json<Value>, ApiError> {
    let label = body.label.unwrap_or_else(|| {
        body.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string())
    });
    let media_type = body
        .media_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let record = state.assets.ingest(&body.source_path, &label, &media_type).await?;
    Ok(Json(json!(record)))
}

#[derive(Debug, Deserialize)]
pub struct ValueBody {
    pub label: String,
    pub value: Value,
    pub media_type: Option<String>,
}

pub async fn create_value_asset(
    State(state): State<AppState>,
    Json(body): Json<ValueBody>,
) -> Result<Json<Value>, ApiError> {
    let media_type = body
        .media_type
        .unwrap_or_else(|| "application/json".to_string());
    let record = state.assets.create_value(&body.label, body.value, &media_type).await?;
    Ok(Json(json!(record)))
}

#[derive(Debug, Deserialize)]
pub struct AssetFilter {
    pub status: Option<String>,
    pub tag: Option<String>,
}

pub async fn list_assets(
    State(state): State<AppState>,
    Query(filter): Query<AssetFilter>,
) -> Result<Json<Value>, ApiError> {
    let mut assets = state.store.list_assets().await?;
    if let Some(status) = &filter.status {
        assets.retain(|a| a.status.to_string().eq_ignore_ascii_case(status));
    }
    if let Some(tag) = &filter.tag {
        assets.retain(|a| a.tags.iter().any(|t| t == tag));
    }
    Ok(Json(json!(assets)))
}

pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let asset = state
        .store
        .get_asset(&AssetId::new(&id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("asset '{}' not found", id)))?;
    Ok(Json(json!(asset)))
}

/// Stream the stored bytes of an `AVAILABLE` `FILE` asset.
pub async fn download_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let asset = state
        .store
        .get_asset(&AssetId::new(&id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("asset '{}' not found", id)))?;

    if asset.status != AssetStatus::Available || asset.kind != AssetKind::File {
        return Err(ApiError::not_found(format!("asset '{}' has no downloadable file", id)));
    }
    let path = asset
        .storage_path
        .filter(|p| p.exists())
        .ok_or_else(|| ApiError::not_found(format!("file for asset '{}' missing on disk", id)))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(format!("read {}: {}", path.display(), e)))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| id.clone());

    Ok((
        [
            (header::CONTENT_TYPE, asset.media_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TaskCreateBody {
    pub module_id: String,
    pub input_mapping: BTreeMap<String, String>,
    pub config: Option<Value>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<TaskCreateBody>,
) -> Result<Json<Value>, ApiError> {
    let receipt = state
        .tasks
        .submit(&ModuleId::new(&body.module_id), &body.input_mapping, body.config)
        .await?;
    let task = state
        .store
        .get_task(&receipt.task_id)
        .await?
        .ok_or_else(|| ApiError::internal("task vanished after submission"))?;
    Ok(Json(json!(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .store
        .get_task(&TaskId::new(&id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task '{}' not found", id)))?;
    Ok(Json(json!(task)))
}

pub async fn get_task_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .store
        .get_task(&TaskId::new(&id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task '{}' not found", id)))?;
    Ok(Json(json!({
        "status": task.status,
        "error_log": task.error_log,
        "logs": task.logs,
    })))
}
