// Group Ledger - Web Server
// REST API + WebSocket event stream with Axum

use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use group_ledger::{
    init_tracing, AppConfig, DeliveryError, ErrorKind, LedgerApp, LedgerError, Listener,
    NewExpense, StableId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

/// Header carrying the current user's stable id
const USER_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
struct AppState {
    app: Arc<LedgerApp>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

enum ApiError {
    Ledger(LedgerError),
    Unauthenticated(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Ledger(e) => {
                let status = match e.kind() {
                    ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::Reference => StatusCode::NOT_FOUND,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "Request failed");
                } else {
                    debug!(error = %e, status = status.as_u16(), "Request rejected");
                }
                (status, e.to_string())
            }
        };
        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Current user
// ============================================================================

/// Stable id of the caller, taken from the `x-user-id` header
struct CurrentUser(StableId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", USER_HEADER)))?;

        value
            .to_str()
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .map(|id| CurrentUser(StableId(id)))
            .ok_or_else(|| {
                ApiError::Unauthenticated(format!("{} must be a numeric user id", USER_HEADER))
            })
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/users
async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<group_ledger::UserView>> {
    ok(state.app.users()?)
}

/// GET /api/groups/:id/members
async fn list_group_members(
    State(state): State<AppState>,
    Path(group): Path<u64>,
) -> ApiResult<Vec<group_ledger::MemberView>> {
    ok(state.app.group_members(StableId(group))?)
}

/// POST /api/expenses - Record an expense paid by the current user
async fn create_expense(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<NewExpense>,
) -> Result<impl IntoResponse, ApiError> {
    let recorded = state.app.expenses.create_expense(user, request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(recorded))))
}

/// GET /api/expenses/:id/splits
async fn list_expense_splits(
    State(state): State<AppState>,
    Path(expense): Path<u64>,
) -> ApiResult<Vec<group_ledger::SplitView>> {
    ok(state.app.expenses.splits_for_expense(StableId(expense))?)
}

/// GET /api/splits/owed - What the current user owes
async fn list_owed_splits(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<group_ledger::SplitView>> {
    ok(state.app.expenses.splits_owed_by(user)?)
}

/// POST /api/splits/:id/settle
async fn settle_split(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(split): Path<u64>,
) -> ApiResult<group_ledger::SettlementOutcome> {
    ok(state.app.settlement.settle(user, StableId(split))?)
}

/// POST /api/splits/:id/remind
async fn remind_split(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(split): Path<u64>,
) -> ApiResult<group_ledger::NotificationView> {
    ok(state.app.settlement.remind(user, StableId(split))?)
}

#[derive(Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

/// GET /api/notifications?unread=true
async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<group_ledger::NotificationView>> {
    ok(state.app.notifier.list_notifications(user, query.unread)?)
}

/// POST /api/notifications/:id/read
async fn mark_notification_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(notification): Path<u64>,
) -> ApiResult<group_ledger::NotificationView> {
    ok(state.app.notifier.mark_read(user, StableId(notification))?)
}

// ============================================================================
// WebSocket
// ============================================================================

/// Hands broadcast payloads to the socket task
struct SocketListener {
    outbox: mpsc::UnboundedSender<String>,
}

impl Listener for SocketListener {
    fn send(&self, payload: &str) -> Result<(), DeliveryError> {
        self.outbox
            .send(payload.to_string())
            .map_err(|_| DeliveryError::Disconnected)
    }
}

/// GET /ws - live ledger events
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (outbox, mut inbox) = mpsc::unbounded_channel::<String>();
    let listener = state.app.channel.connect(Arc::new(SocketListener { outbox }));

    loop {
        tokio::select! {
            outgoing = inbox.recv() => match outgoing {
                Some(payload) => {
                    if let Err(e) = socket.send(Message::Text(payload)).await {
                        warn!(listener = listener.0, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(listener = listener.0, error = %e, "WebSocket receive failed");
                    break;
                }
            },
        }
    }

    state.app.channel.disconnect(listener);
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/users", get(list_users))
        .route("/groups/:id/members", get(list_group_members))
        .route("/expenses", post(create_expense))
        .route("/expenses/:id/splits", get(list_expense_splits))
        .route("/splits/owed", get(list_owed_splits))
        .route("/splits/:id/settle", post(settle_split))
        .route("/splits/:id/remind", post(remind_split))
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", post(mark_notification_read));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(websocket_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config)?;

    info!(version = group_ledger::VERSION, "🌐 Group Ledger server starting");

    let app = LedgerApp::open(&config)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    let state = AppState { app: Arc::new(app) };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "🚀 Server running");
    info!("   API: http://{}/api/health", config.bind_addr);
    info!("   WS:  ws://{}/ws", config.bind_addr);

    axum::serve(listener, router(state))
        .await
        .context("Server stopped unexpectedly")
}
