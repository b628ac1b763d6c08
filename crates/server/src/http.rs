//! HTTP Endpoints
//!
//! JSON chat API, a Server-Sent Events variant of the chat endpoint and the
//! browser chat page.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::{delete, get, post},
    Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use sales_rag_agent::{TurnOutcome, TurnPlan};
use sales_rag_core::{Message, ProductHit};

use crate::metrics::{metrics_handler, record_request, record_turn_latency};
use crate::session::Session;
use crate::state::AppState;
use crate::ServerError;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(delete_session))
        .route("/api/sessions/:id/messages", get(get_messages))
        // Chat
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

/// CORS from configured origins; an empty list allows any origin
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("All configured CORS origins are invalid, allowing any origin");
        return base.allow_origin(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed.len());
    base.allow_origin(parsed)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub route: String,
    pub rewritten_query: Option<String>,
    pub reply: String,
    pub sources: Vec<ProductHit>,
}

impl ChatResponse {
    fn new(session_id: &str, outcome: TurnOutcome) -> Self {
        match outcome {
            TurnOutcome::Clarify { message } => Self {
                session_id: session_id.to_string(),
                route: sales_rag_config::constants::router::UNCERTAIN.to_string(),
                rewritten_query: None,
                reply: message,
                sources: Vec::new(),
            },
            TurnOutcome::Answered {
                route,
                rewritten_query,
                hits,
                reply,
            } => Self {
                session_id: session_id.to_string(),
                route,
                rewritten_query: Some(rewritten_query),
                reply,
                sources: hits,
            },
        }
    }
}

/// First event of a streamed turn
#[derive(Debug, Serialize)]
struct RouteEvent<'a> {
    session_id: &'a str,
    route: &'a str,
    rewritten_query: Option<&'a str>,
    sources: &'a [ProductHit],
}

#[derive(Debug, Serialize)]
struct SessionCreated {
    session_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct MessagesResponse {
    session_id: String,
    messages: Vec<Message>,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.agent.retriever().store().name(),
        "sessions": state.sessions.count(),
    }))
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionCreated>), ServerError> {
    let session = state.sessions.create(state.agent.new_conversation())?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id.clone(),
            created_at: session.created_at,
        }),
    ))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::SessionNotFound(id))
    }
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ServerError> {
    let session = state
        .sessions
        .get(&id)
        .ok_or_else(|| ServerError::SessionNotFound(id.clone()))?;
    let messages = session.conversation.lock().await.dialogue().to_vec();
    Ok(Json(MessagesResponse {
        session_id: id,
        messages,
    }))
}

/// Existing session by id, or a new one when no id is given
fn resolve_session(state: &AppState, id: Option<&str>) -> Result<Arc<Session>, ServerError> {
    match id {
        Some(id) => state
            .sessions
            .get(id)
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string())),
        None => state.sessions.create(state.agent.new_conversation()),
    }
}

fn validate_message(message: &str) -> Result<&str, ServerError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ServerError::InvalidRequest("message is empty".to_string()));
    }
    Ok(message)
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    // Detached so a request timeout cannot drop a turn between the user
    // message and the reply
    let turn = tokio::spawn(async move {
        let result = run_turn(&state, &request).await;
        let status = match &result {
            Ok(_) => StatusCode::OK,
            Err(e) => e.status(),
        };
        record_request("chat", status);
        result
    });

    turn.await
        .unwrap_or_else(|e| Err(ServerError::Internal(format!("chat turn aborted: {}", e))))
        .map(Json)
}

async fn run_turn(state: &AppState, request: &ChatRequest) -> Result<ChatResponse, ServerError> {
    let message = validate_message(&request.message)?;
    let session = resolve_session(state, request.session_id.as_deref())?;

    let started = Instant::now();
    let outcome = {
        let mut conversation = session.conversation.lock().await;
        state.agent.handle(&mut conversation, message, None).await?
    };
    session.touch();
    record_turn_latency(outcome.route(), started.elapsed());

    Ok(ChatResponse::new(&session.id, outcome))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let message = validate_message(&request.message)?.to_string();
    let session = resolve_session(&state, request.session_id.as_deref())?;
    record_request("chat_stream", StatusCode::OK);

    let (events_tx, events_rx) = mpsc::channel(64);
    tokio::spawn(stream_turn(state, session, message, events_tx));

    Ok(Sse::new(ReceiverStream::new(events_rx)).keep_alive(KeepAlive::default()))
}

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Emit `route`, then `token` per streamed chunk, then `done` with the
/// full response. Failures end the stream with an `error` event.
async fn stream_turn(state: AppState, session: Arc<Session>, message: String, events: EventSender) {
    let started = Instant::now();
    let mut conversation = session.conversation.lock().await;

    let plan = match state.agent.begin_turn(&mut conversation, &message).await {
        Ok(plan) => plan,
        Err(e) => {
            send_error(&events, &e.to_string()).await;
            return;
        }
    };

    let result = match plan {
        TurnPlan::Clarify { message } => {
            send_json(
                &events,
                "route",
                &RouteEvent {
                    session_id: &session.id,
                    route: sales_rag_config::constants::router::UNCERTAIN,
                    rewritten_query: None,
                    sources: &[],
                },
            )
            .await;
            Ok(TurnOutcome::Clarify { message })
        }
        TurnPlan::Answer(pending) => {
            send_json(
                &events,
                "route",
                &RouteEvent {
                    session_id: &session.id,
                    route: pending.route(),
                    rewritten_query: Some(pending.rewritten_query()),
                    sources: pending.hits(),
                },
            )
            .await;

            let (token_tx, mut token_rx) = mpsc::channel::<String>(64);
            let token_events = events.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(token) = token_rx.recv().await {
                    let Some(event) = token_event(&token) else {
                        continue;
                    };
                    if token_events.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            });

            let result = state
                .agent
                .complete_turn(&mut conversation, pending, Some(token_tx))
                .await;
            let _ = forwarder.await;
            result
        }
    };
    drop(conversation);
    session.touch();

    match result {
        Ok(outcome) => {
            record_turn_latency(outcome.route(), started.elapsed());
            send_json(&events, "done", &ChatResponse::new(&session.id, outcome)).await;
        }
        Err(e) => send_error(&events, &e.to_string()).await,
    }
}

/// Token chunks are JSON strings so line breaks survive the SSE framing
fn token_event(token: &str) -> Option<Event> {
    match Event::default().event("token").json_data(token) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode token event");
            None
        }
    }
}

async fn send_json<T: Serialize>(events: &EventSender, name: &str, payload: &T) {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => {
            let _ = events.send(Ok(event)).await;
        }
        Err(e) => tracing::error!(error = %e, event = name, "Failed to encode event"),
    }
}

async fn send_error(events: &EventSender, message: &str) {
    tracing::warn!(error = message, "Streamed turn failed");
    let payload = serde_json::json!({ "error": message });
    send_json(events, "error", &payload).await;
}
