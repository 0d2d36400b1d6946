//! HTTP handlers for the operational surface. Grounded on the
//! teacher's thin `State<GatewayState>` + `Json`/`IntoResponse` handler
//! style (`gateway/routes.rs`), widened to the kernel's larger endpoint
//! table and backed by the database models built for each logical table.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::database::models::{
    ChatMessageRow, GallaLogRow, InboxMessageRow, LibraryCommentRow, LibraryItemRow, LlmCallRow, MemoryRow,
    NewChatMessageRow, NewGallaLogRow, NewInboxMessageRow, NewLibraryCommentRow, NewLibraryItemRow, NewMemoryRow,
};
use crate::database::schema::{chat_messages, galla_log, inbox_messages, library_comments, library_items, llm_calls, memories};
use crate::event_bus::AppEvent;
use crate::llm::adapter::EMBED_DIM_CAP;
use crate::llm::types::Request as ThinkRequest;

use super::state::{require_setup_complete, ApiError, GatewayState};

fn db(state: &GatewayState) -> Result<crate::database::DbConn, ApiError> {
    Ok(state.pool.get()?)
}

// ─── /api/think ─────────────────────────────────────────────────────────

pub async fn think(State(state): State<GatewayState>, Json(request): Json<ThinkRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    if !request.is_valid() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "messages must not be empty"));
    }
    let response = state.proxy.think(request).await?;
    Ok(Json(response))
}

// ─── /api/memory/{store,search} ────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MemoryStoreRequest {
    pub content: String,
}

fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().take(EMBED_DIM_CAP).flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let dot: f32 = a[..len].iter().zip(&b[..len]).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub async fn memory_store(State(state): State<GatewayState>, Json(req): Json<MemoryStoreRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let (vector, _tokens, _cost) = state.proxy.embed(&req.content).await?;
    let embedding = embedding_to_bytes(&vector);
    let row = NewMemoryRow::new(&req.content, Some(embedding));
    let mut conn = db(&state)?;
    diesel::insert_into(memories::table).values(&row).execute(&mut conn)?;
    state.bus.publish(AppEvent::Memory(json!({ "action": "stored", "id": row.id }))).ok();
    Ok((StatusCode::CREATED, Json(json!({ "id": row.id }))))
}

#[derive(Debug, Deserialize)]
pub struct MemorySearchRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

fn default_search_limit() -> i64 {
    5
}

#[derive(Debug, Serialize)]
pub struct MemorySearchResult {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// No vector index is built — this is a full scan scored
/// by cosine similarity, adequate for the table sizes a single agent's
/// memory store reaches.
pub async fn memory_search(State(state): State<GatewayState>, Json(req): Json<MemorySearchRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let (query_vector, _tokens, _cost) = state.proxy.embed(&req.query).await?;

    let mut conn = db(&state)?;
    let rows: Vec<MemoryRow> = memories::table.load(&mut conn)?;
    drop(conn);

    let mut scored: Vec<MemorySearchResult> = rows
        .into_iter()
        .filter_map(|row| {
            let embedding = row.embedding.as_ref()?;
            let vector = bytes_to_embedding(embedding);
            let score = cosine_similarity(&query_vector, &vector);
            Some(MemorySearchResult { id: row.id, content: row.content, score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(req.limit.max(0) as usize);
    Ok(Json(scored))
}

// ─── /api/budget, /api/budget/breakdown ────────────────────────────────

pub async fn budget(State(state): State<GatewayState>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let budget = state.proxy.budget_tracker().await;
    let status = budget.get_all_budget_status()?;
    Ok(Json(status))
}

pub async fn budget_breakdown(State(state): State<GatewayState>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let budget = state.proxy.budget_tracker().await;
    let breakdown = budget.breakdown_by_model()?;
    Ok(Json(breakdown))
}

// ─── /api/status ────────────────────────────────────────────────────────

pub async fn status(State(state): State<GatewayState>) -> impl IntoResponse {
    let agent = state.supervisor.status_snapshot();
    Json(json!({
        "agent": agent,
        "uptime_seconds": state.supervisor.uptime_seconds(),
        "in_grace_period": state.supervisor.in_grace_period(),
    }))
}

// ─── /api/restart, /api/rollback, /api/commit ──────────────────────────

pub async fn restart(State(state): State<GatewayState>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let genesis = state.config.get_genesis().map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state
        .supervisor
        .restart_agent(&state.bootstrap_script_path, &genesis.system_prompt)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub target: String,
}

pub async fn rollback(State(state): State<GatewayState>, Json(req): Json<RollbackRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    state.supervisor.snapshot().rollback(&req.target).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub message: String,
}

pub async fn commit(State(state): State<GatewayState>, Json(req): Json<CommitRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let hash = state.supervisor.snapshot().commit(&req.message).await?;
    Ok(Json(json!({ "hash": hash })))
}

// ─── /api/log ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AgentLogRequest {
    pub level: String,
    pub message: String,
}

pub async fn agent_log(State(state): State<GatewayState>, Json(req): Json<AgentLogRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    tracing::info!(target: "agent", level = %req.level, message = %req.message, "agent log forwarded");
    state.proxy.audit_log_forwarded(&req.level, &req.message);
    Ok(StatusCode::ACCEPTED)
}

// ─── /api/chat ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub last: Option<i64>,
    pub since_id: Option<String>,
    pub unread: Option<bool>,
    pub source: Option<String>,
}

pub async fn chat_list(State(state): State<GatewayState>, Query(q): Query<ChatQuery>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let mut query = chat_messages::table.into_boxed();
    if let Some(source) = &q.source {
        query = query.filter(chat_messages::source.eq(source.clone()));
    }
    if q.unread == Some(true) {
        query = query.filter(chat_messages::read.eq(0));
    }
    if let Some(since_id) = &q.since_id {
        query = query.filter(chat_messages::id.gt(since_id.clone()));
    }
    query = query.order(chat_messages::created_at.desc());
    if let Some(last) = q.last {
        query = query.limit(last);
    }
    let rows: Vec<ChatMessageRow> = query.load(&mut conn)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ChatPostRequest {
    pub source: String,
    pub galla: Option<i32>,
    pub role: String,
    pub content: String,
}

pub async fn chat_post(State(state): State<GatewayState>, Json(req): Json<ChatPostRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let row = NewChatMessageRow::new(&req.source, req.galla, &req.role, &req.content);
    let mut conn = db(&state)?;
    diesel::insert_into(chat_messages::table).values(&row).execute(&mut conn)?;
    state
        .bus
        .publish(AppEvent::Chat(json!({ "id": row.id, "source": row.source, "role": row.role, "content": row.content })))
        .ok();
    Ok((StatusCode::CREATED, Json(json!({ "id": row.id }))))
}

pub async fn chat_ack(State(state): State<GatewayState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    diesel::update(chat_messages::table.find(id))
        .set(chat_messages::read.eq(1))
        .execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── /api/inbox ─────────────────────────────────────────────────────────

pub async fn inbox_list(State(state): State<GatewayState>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let rows: Vec<InboxMessageRow> = inbox_messages::table.order(inbox_messages::created_at.desc()).load(&mut conn)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct InboxPostRequest {
    pub content: String,
}

pub async fn inbox_post(State(state): State<GatewayState>, Json(req): Json<InboxPostRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let row = NewInboxMessageRow::new("kernel_to_agent", &req.content);
    let mut conn = db(&state)?;
    diesel::insert_into(inbox_messages::table).values(&row).execute(&mut conn)?;
    drop(conn);
    state.supervisor.write_inbox(&req.content).await?;
    state.bus.publish(AppEvent::Inbox(json!({ "id": row.id, "content": row.content }))).ok();
    Ok((StatusCode::CREATED, Json(json!({ "id": row.id }))))
}

// ─── /api/library ───────────────────────────────────────────────────────

pub async fn library_list(State(state): State<GatewayState>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let rows: Vec<LibraryItemRow> = library_items::table.order(library_items::updated_at.desc()).load(&mut conn)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct LibraryCreateRequest {
    pub title: String,
    pub body: String,
}

pub async fn library_create(State(state): State<GatewayState>, Json(req): Json<LibraryCreateRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let row = NewLibraryItemRow::new(&req.title, &req.body);
    let mut conn = db(&state)?;
    diesel::insert_into(library_items::table).values(&row).execute(&mut conn)?;
    state.bus.publish(AppEvent::Library(json!({ "action": "created", "id": row.id }))).ok();
    Ok((StatusCode::CREATED, Json(json!({ "id": row.id }))))
}

#[derive(Debug, Deserialize)]
pub struct LibraryUpdateRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub status: Option<String>,
}

pub async fn library_update(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(req): Json<LibraryUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let existing: LibraryItemRow = library_items::table.find(id.clone()).first(&mut conn)?;
    let updated_at = crate::database::utils::now_rfc3339();
    diesel::update(library_items::table.find(id.clone()))
        .set((
            library_items::title.eq(req.title.unwrap_or(existing.title)),
            library_items::body.eq(req.body.unwrap_or(existing.body)),
            library_items::status.eq(req.status.unwrap_or(existing.status)),
            library_items::updated_at.eq(updated_at),
        ))
        .execute(&mut conn)?;
    state.bus.publish(AppEvent::Library(json!({ "action": "updated", "id": id }))).ok();
    Ok(StatusCode::NO_CONTENT)
}

pub async fn library_delete(State(state): State<GatewayState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    diesel::delete(library_items::table.find(id.clone())).execute(&mut conn)?;
    state.bus.publish(AppEvent::Library(json!({ "action": "deleted", "id": id }))).ok();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LibraryCommentRequest {
    pub author: String,
    pub body: String,
}

pub async fn library_comment(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(req): Json<LibraryCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let row = NewLibraryCommentRow::new(&id, &req.author, &req.body);
    let mut conn = db(&state)?;
    diesel::insert_into(library_comments::table).values(&row).execute(&mut conn)?;
    state.bus.publish(AppEvent::Library(json!({ "action": "commented", "item_id": id }))).ok();
    Ok((StatusCode::CREATED, Json(json!({ "id": row.id }))))
}

pub async fn library_comments_list(State(state): State<GatewayState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let rows: Vec<LibraryCommentRow> = library_comments::table
        .filter(library_comments::item_id.eq(&id))
        .order(library_comments::created_at.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

// ─── /api/heartbeat ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub phase: String,
    pub galla: i64,
}

pub async fn heartbeat(State(state): State<GatewayState>, Json(req): Json<HeartbeatRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    state.supervisor.set_heartbeat(req.galla, req.phase.clone());
    state
        .bus
        .publish(AppEvent::Heartbeat(json!({ "galla": req.galla, "phase": req.phase })))
        .ok();
    Ok(StatusCode::NO_CONTENT)
}

// ─── /api/galla ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GallaPostRequest {
    pub galla: i32,
    pub plan: Option<String>,
    pub summary: Option<String>,
}

pub async fn galla_post(State(state): State<GatewayState>, Json(req): Json<GallaPostRequest>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let row = NewGallaLogRow::new(req.galla, req.plan);
    diesel::insert_into(galla_log::table)
        .values(&row)
        .on_conflict(galla_log::galla)
        .do_update()
        .set((
            galla_log::plan.eq(&row.plan),
            galla_log::summary.eq(req.summary),
            galla_log::updated_at.eq(crate::database::utils::now_rfc3339()),
        ))
        .execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn galla_list(State(state): State<GatewayState>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let rows: Vec<GallaLogRow> = galla_log::table.order(galla_log::galla.desc()).load(&mut conn)?;
    Ok(Json(rows))
}

// ─── /api/llm-calls ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LlmCallsQuery {
    pub intent: Option<String>,
    #[serde(default = "default_page_size")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_page_size() -> i64 {
    50
}

pub async fn llm_calls_list(State(state): State<GatewayState>, Query(q): Query<LlmCallsQuery>) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;
    let mut conn = db(&state)?;
    let mut query = llm_calls::table.into_boxed();
    if let Some(intent) = &q.intent {
        query = query.filter(llm_calls::intent.eq(intent.clone()));
    }
    let rows: Vec<LlmCallRow> = query
        .order(llm_calls::created_at.desc())
        .limit(q.limit)
        .offset(q.offset)
        .load(&mut conn)?;
    Ok(Json(rows))
}

// ─── /jodo/* ────────────────────────────────────────────────────────────

/// Reverse proxy into the agent's self-hosted app. Translates
/// between axum's http-1.0 types and reqwest 0.11's http-0.2 types by
/// hand — the two crates pin incompatible `http` majors.
pub async fn jodo_proxy(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    require_setup_complete(&state.config)?;

    let downstream_path = uri.path().strip_prefix("/jodo").unwrap_or(uri.path());
    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let target = format!("{}{downstream_path}{query}", state.supervisor.agent_base_url());

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = state.http_client.request(reqwest_method, &target).body(body.to_vec());
    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        if let Ok(value_str) = value.to_str() {
            builder = builder.header(name.as_str(), value_str);
        }
    }

    let upstream = builder
        .send()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, format!("jodo upstream unreachable: {e}")))?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let upstream_headers = upstream.headers().clone();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, format!("jodo upstream body read failed: {e}")))?;

    let mut response = (status, bytes).into_response();
    for (name, value) in upstream_headers.iter() {
        let name_str = name.as_str();
        if name_str.eq_ignore_ascii_case("transfer-encoding") || name_str.eq_ignore_ascii_case("connection") {
            continue;
        }
        let (Ok(header_name), Ok(value_str)) = (HeaderName::from_bytes(name_str.as_bytes()), value.to_str()) else {
            continue;
        };
        if let Ok(header_value) = HeaderValue::from_str(value_str) {
            response.headers_mut().insert(header_name, header_value);
        }
    }
    Ok(response)
}

