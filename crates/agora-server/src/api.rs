//! HTTP surface: routing, request/response DTOs, and the glue from
//! mutations to hub broadcasts and notification email.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, Method},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use agora_shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PROTOCOL_VERSION};
use agora_shared::protocol::ServerFrame;
use agora_shared::Identity;
use agora_store::{
    BlockEdge, Conversation, ConversationStore, GroupPatch, GroupType, Message, PostMode,
};

use crate::blocklist::{BlockRegistry, Visibility};
use crate::config::ServerConfig;
use crate::conversations::ConversationService;
use crate::directory::PlatformDirectory;
use crate::error::{bounded, ApiError};
use crate::groups::{GroupService, NewGroup};
use crate::hub::Hub;
use crate::identity::IdentityVerifier;
use crate::ledger::MessageLedger;
use crate::notify::Notifier;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub blocks: BlockRegistry,
    pub conversations: ConversationService,
    pub groups: GroupService,
    pub ledger: MessageLedger,
    pub hub: Hub,
    pub identity: IdentityVerifier,
    pub directory: PlatformDirectory,
    pub notifier: Option<Notifier>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/ws", get(crate::ws::ws_handler))
        .route("/conversations", get(list_conversations))
        .route("/conversations/direct", post(open_direct))
        .route("/conversations/group", post(create_group))
        .route("/conversations/:id", get(get_conversation).patch(patch_group))
        .route("/conversations/:id/accept", post(accept_request))
        .route("/conversations/:id/decline", post(decline_request))
        .route("/conversations/:id/block", post(block_conversation))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:id/participants", post(update_participants))
        .route("/messages/:id/reactions", post(toggle_reaction))
        .route("/blocks", get(list_blocks).post(create_block))
        .route("/blocks/:target", delete(remove_block))
        .route("/identities/key", post(publish_key))
        .route("/admin/status", get(admin_status))
        .route("/admin/purge-conversation", post(admin_purge))
        .route("/admin/directory", post(admin_directory_sync))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Auth helpers
// ---------------------------------------------------------------------------

async fn require_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let raw = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        return Err(ApiError::AuthenticationRequired);
    }
    state
        .identity
        .verify_bearer(token)
        .await
        .ok_or(ApiError::AuthenticationRequired)
}

/// Verify the caller and resolve their block snapshot in one step; the
/// snapshot is threaded through every read and write below.
async fn authed_vis(state: &AppState, headers: &HeaderMap) -> Result<Visibility, ApiError> {
    let identity = require_identity(state, headers).await?;
    state.blocks.visibility_for(&identity).await
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ApiError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ApiError::PermissionDenied(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    // Constant-time comparison to prevent timing attacks on the admin token.
    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ApiError::PermissionDenied("Invalid admin token".into()));
    }

    Ok(())
}

fn parse_handle(raw: &str) -> Result<Identity, ApiError> {
    Identity::parse(raw).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

fn parse_handles(raw: &[String]) -> Result<BTreeSet<Identity>, ApiError> {
    raw.iter().map(|s| parse_handle(s)).collect()
}

// ---------------------------------------------------------------------------
// Pagination and projection
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PageParams {
    limit: Option<u32>,
    offset: Option<u32>,
    fields: Option<String>,
}

impl PageParams {
    fn clamp(&self) -> (u32, u32) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0))
    }
}

/// Keep only the requested top-level fields (`id` always survives).
fn project(value: serde_json::Value, fields: &str) -> serde_json::Value {
    let keep: HashSet<&str> = fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(key, _)| key == "id" || keep.contains(key.as_str()))
                .collect(),
        ),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Broadcast / notification glue
// ---------------------------------------------------------------------------

async fn broadcast_conversation(state: &AppState, conversation: &Conversation) {
    let frame = ServerFrame::ConversationUpdated {
        conversation_id: conversation.id,
        conversation: serde_json::to_value(conversation).unwrap_or_default(),
    };
    state
        .hub
        .broadcast(conversation.participants.iter(), &frame)
        .await;
}

async fn broadcast_message(state: &AppState, conversation: &Conversation, message: &Message) {
    let frame = ServerFrame::MessageNew {
        conversation_id: conversation.id,
        conversation: serde_json::to_value(conversation).unwrap_or_default(),
        message: serde_json::to_value(message).unwrap_or_default(),
    };
    state
        .hub
        .broadcast(conversation.participants.iter(), &frame)
        .await;
}

/// Email the offline, non-suppressed recipients.  Best effort end to end.
async fn notify_recipients(
    state: &AppState,
    vis: &Visibility,
    conversation: &Conversation,
    subject: &str,
    body: String,
) {
    let Some(notifier) = &state.notifier else {
        return;
    };
    for participant in &conversation.participants {
        if participant == vis.viewer() || vis.suppressed(participant) {
            continue;
        }
        if state.hub.is_online(participant).await {
            continue;
        }
        if let Some(email) = state.directory.email_for(participant).await {
            notifier.spawn_notice(email, subject.to_string(), body.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Public endpoints
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    protocol: &'static str,
    store_backend: &'static str,
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        protocol: PROTOCOL_VERSION,
        store_backend: state.config.store_backend.as_str(),
    })
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OpenDirectRequest {
    peer: String,
}

async fn open_direct(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<OpenDirectRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let peer = parse_handle(&req.peer)?;

    let (conversation, created) = state.conversations.open_direct(&vis, &peer).await?;
    if created {
        broadcast_conversation(&state, &conversation).await;
        notify_recipients(
            &state,
            &vis,
            &conversation,
            "New conversation request",
            format!("{} wants to start a conversation with you.", vis.viewer()),
        )
        .await;
    }
    Ok(Json(conversation))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest {
    name: String,
    avatar_ref: Option<String>,
    group_type: Option<String>,
    movement_ref: Option<Uuid>,
    #[serde(default)]
    participants: Vec<String>,
    post_mode: Option<String>,
    #[serde(default)]
    admin_set: Vec<String>,
    #[serde(default)]
    poster_allowlist: Vec<String>,
}

async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;

    let group_type = match req.group_type.as_deref() {
        None => GroupType::Custom,
        Some(raw) => GroupType::parse(raw)
            .ok_or_else(|| ApiError::InvalidRequest(format!("unknown groupType: {raw}")))?,
    };
    let post_mode = match req.post_mode.as_deref() {
        None => PostMode::All,
        Some(raw) => PostMode::parse(raw)
            .ok_or_else(|| ApiError::InvalidRequest(format!("unknown postMode: {raw}")))?,
    };

    let new_group = NewGroup {
        name: req.name,
        avatar_ref: req.avatar_ref,
        group_type,
        movement_ref: req.movement_ref,
        participants: parse_handles(&req.participants)?,
        post_mode,
        admin_set: parse_handles(&req.admin_set)?,
        poster_allowlist: parse_handles(&req.poster_allowlist)?,
    };

    let conversation = state.groups.create(vis.viewer(), new_group).await?;
    broadcast_conversation(&state, &conversation).await;
    Ok(Json(conversation))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let (limit, offset) = page.clamp();

    let conversations = state.conversations.list_for(&vis, limit, offset).await?;
    let mut values = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        let mut value = serde_json::to_value(conversation).unwrap_or_default();
        if let Some(fields) = &page.fields {
            value = project(value, fields);
        }
        values.push(value);
    }
    Ok(Json(serde_json::Value::Array(values)))
}

async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let conversation = state.conversations.get_for(&vis, id).await?;
    Ok(Json(conversation))
}

async fn accept_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let conversation = state.conversations.accept(&vis, id).await?;
    broadcast_conversation(&state, &conversation).await;
    Ok(Json(conversation))
}

async fn decline_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let conversation = state.conversations.decline(&vis, id).await?;
    broadcast_conversation(&state, &conversation).await;
    Ok(Json(conversation))
}

async fn block_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let conversation = state.conversations.block(&vis, id).await?;
    broadcast_conversation(&state, &conversation).await;
    Ok(Json(conversation))
}

// ---------------------------------------------------------------------------
// Group management
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchGroupRequest {
    name: Option<String>,
    avatar_ref: Option<String>,
    post_mode: Option<String>,
    admin_set: Option<Vec<String>>,
    poster_allowlist: Option<Vec<String>>,
}

async fn patch_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PatchGroupRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;

    let post_mode = req
        .post_mode
        .as_deref()
        .map(|raw| {
            PostMode::parse(raw)
                .ok_or_else(|| ApiError::InvalidRequest(format!("unknown postMode: {raw}")))
        })
        .transpose()?;

    let patch = GroupPatch {
        name: req.name,
        avatar_ref: req.avatar_ref.map(Some),
        post_mode,
        admin_set: req.admin_set.as_deref().map(parse_handles).transpose()?,
        poster_allowlist: req
            .poster_allowlist
            .as_deref()
            .map(parse_handles)
            .transpose()?,
    };

    let conversation = state.groups.patch(&vis, id, patch).await?;
    broadcast_conversation(&state, &conversation).await;
    Ok(Json(conversation))
}

#[derive(Deserialize)]
struct ParticipantsRequest {
    #[serde(default)]
    add: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
}

async fn update_participants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ParticipantsRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let add = parse_handles(&req.add)?.into_iter().collect();
    let remove = parse_handles(&req.remove)?.into_iter().collect();

    let conversation = state.groups.update_membership(&vis, id, add, remove).await?;
    broadcast_conversation(&state, &conversation).await;
    Ok(Json(conversation))
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let (limit, offset) = page.clamp();

    let messages = state.ledger.page(&vis, id, limit, offset).await?;
    let mut values = Vec::with_capacity(messages.len());
    for message in &messages {
        let mut value = serde_json::to_value(message).unwrap_or_default();
        if let Some(fields) = &page.fields {
            value = project(value, fields);
        }
        values.push(value);
    }
    Ok(Json(serde_json::Value::Array(values)))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    body: String,
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;

    let (conversation, message) = state.ledger.append(&vis, id, &req.body).await?;
    broadcast_message(&state, &conversation, &message).await;
    notify_recipients(
        &state,
        &vis,
        &conversation,
        "New message",
        format!("{} sent you a message.", vis.viewer()),
    )
    .await;
    Ok(Json(message))
}

#[derive(Deserialize)]
struct ReactionRequest {
    emoji: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReactionResponse {
    present: bool,
    message: Message,
}

async fn toggle_reaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let vis = authed_vis(&state, &headers).await?;
    let (_, message, present) = state.ledger.toggle_reaction(&vis, id, &req.emoji).await?;
    Ok(Json(ReactionResponse { present, message }))
}

// ---------------------------------------------------------------------------
// Block registry
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BlockRequest {
    target: String,
}

async fn create_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BlockRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let me = require_identity(&state, &headers).await?;
    let target = parse_handle(&req.target)?;

    state.blocks.block(&me, &target).await?;
    Ok(Json(serde_json::json!({ "blocked": true })))
}

async fn remove_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let me = require_identity(&state, &headers).await?;
    let target = parse_handle(&target)?;

    let removed = state.blocks.unblock(&me, &target).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

async fn list_blocks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BlockEdge>>, ApiError> {
    let me = require_identity(&state, &headers).await?;
    let edges = state.blocks.list_for(&me).await?;
    Ok(Json(edges))
}

// ---------------------------------------------------------------------------
// Identity keys
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishKeyRequest {
    public_key: String,
}

async fn publish_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PublishKeyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let me = require_identity(&state, &headers).await?;

    let key = req.public_key.trim();
    if key.is_empty() || key.len() > 512 {
        return Err(ApiError::InvalidRequest(
            "publicKey must be 1-512 characters".into(),
        ));
    }

    state.directory.publish_key(&me, key.to_string()).await;
    info!(identity = %me, "encryption key published");
    Ok(Json(serde_json::json!({ "published": true })))
}

// ---------------------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminStatusResponse {
    name: String,
    store_backend: &'static str,
    live_connections: usize,
}

async fn admin_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ApiError> {
    verify_admin_token(&headers, &state.config)?;

    Ok(Json(AdminStatusResponse {
        name: state.config.instance_name.clone(),
        store_backend: state.config.store_backend.as_str(),
        live_connections: state.hub.connection_count().await,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminPurgeRequest {
    conversation_id: Uuid,
}

/// The only hard delete in the system.
async fn admin_purge(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AdminPurgeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_admin_token(&headers, &state.config)?;

    let purged = bounded(
        state.config.ops_timeout,
        state.store.delete_conversation(req.conversation_id),
    )
    .await?;
    info!(id = %req.conversation_id, purged, "admin purge");
    Ok(Json(serde_json::json!({ "purged": purged })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectorySyncRequest {
    #[serde(default)]
    follows: Vec<FollowEntry>,
    #[serde(default)]
    movements: Vec<MovementEntry>,
    #[serde(default)]
    approvals: Vec<ApprovalEntry>,
    #[serde(default)]
    opt_outs: Vec<OptOutEntry>,
    #[serde(default)]
    emails: Vec<EmailEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowEntry {
    follower: String,
    followed: String,
    active: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovementEntry {
    id: Uuid,
    owner: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalEntry {
    movement: Uuid,
    identity: String,
    approved: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptOutEntry {
    identity: String,
    opted_out: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailEntry {
    identity: String,
    email: String,
}

/// Batch sync from the wider platform into the directory collaborator.
async fn admin_directory_sync(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<DirectorySyncRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    verify_admin_token(&headers, &state.config)?;

    for entry in &req.follows {
        state
            .directory
            .set_follow(
                &parse_handle(&entry.follower)?,
                &parse_handle(&entry.followed)?,
                entry.active,
            )
            .await;
    }
    for entry in &req.movements {
        state
            .directory
            .set_movement_owner(entry.id, parse_handle(&entry.owner)?)
            .await;
    }
    for entry in &req.approvals {
        state
            .directory
            .set_approved_submitter(entry.movement, &parse_handle(&entry.identity)?, entry.approved)
            .await;
    }
    for entry in &req.opt_outs {
        state
            .directory
            .set_opt_out(&parse_handle(&entry.identity)?, entry.opted_out)
            .await;
    }
    for entry in &req.emails {
        state
            .directory
            .set_email(&parse_handle(&entry.identity)?, entry.email.clone())
            .await;
    }

    Ok(Json(serde_json::json!({ "synced": true })))
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_keeps_id_and_requested_fields() {
        let value = serde_json::json!({
            "id": "abc",
            "kind": "group",
            "name": "organizers",
            "participants": ["a", "b"],
        });

        let projected = project(value, "name, kind");
        assert_eq!(
            projected,
            serde_json::json!({ "id": "abc", "kind": "group", "name": "organizers" })
        );
    }

    #[test]
    fn page_params_are_clamped() {
        let params = PageParams {
            limit: Some(10_000),
            offset: Some(5),
            fields: None,
        };
        assert_eq!(params.clamp(), (MAX_PAGE_SIZE, 5));

        let params = PageParams {
            limit: Some(0),
            offset: None,
            fields: None,
        };
        assert_eq!(params.clamp(), (1, 0));

        let params = PageParams {
            limit: None,
            offset: None,
            fields: None,
        };
        assert_eq!(params.clamp(), (DEFAULT_PAGE_SIZE, 0));
    }
}
