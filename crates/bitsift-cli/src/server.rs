//! Query-session server.
//!
//! Protocol on `/ws`:
//! → Client sends: `{"query": "..."}`
//! ← Server sends: `{"state": "SEARCHING_LOCAL", "result": {...}}` (zero or more progress frames)
//! ← Server sends: `{"state": "SUCCESS" | "ERROR", "result": ...}` (exactly one per query)
//!
//! A query arriving while the connection's previous one is still running is
//! ignored.
//!
//! Plain HTTP:
//! - `GET /api/ping` answers `pong`
//! - `GET /api/document/{id}` returns the full text of the document owning a
//!   point id, or 404 when there is none

use anyhow::{Context, Result};
use crate::output::JsonDocument;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bitsift_core::retrieval::cascade::{CascadeOutcome, CascadeStage};
use bitsift_core::session::{ClientFrame, QueryState, ServerFrame, SessionId};
use bitsift_core::AppContext;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Builds the HTTP router.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/ping", get(ping))
        .route("/api/document/{id}", get(document))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serves until Ctrl-C.
pub async fn serve(ctx: Arc<AppContext>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")
}

async fn ping() -> &'static str {
    "pong"
}

/// Full text of the document owning `id`.
async fn document(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    match ctx.retriever.resolve_full_document_text(&id).await {
        Ok(text) if text.is_empty() => {
            (StatusCode::NOT_FOUND, format!("No text found for {id}")).into_response()
        }
        Ok(text) => Json(JsonDocument::new(&id, &text)).into_response(),
        Err(e) => {
            warn!("Document lookup for {} failed: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<AppContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Handles one connection: one session for its lifetime.
async fn handle_socket(socket: WebSocket, ctx: Arc<AppContext>) {
    let session = ctx.sessions.open();
    info!("Client connected (session {})", session);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!("Ignoring malformed frame: {}", e);
                        continue;
                    }
                };
                if !ctx.sessions.try_begin(session) {
                    continue;
                }
                tokio::spawn(run_query(ctx.clone(), session, frame.query, tx.clone()));
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    ctx.sessions.close(session);
    writer.abort();
    info!("Client disconnected (session {})", session);
}

/// Runs one query to completion, pushing frames while the session is open.
async fn run_query(
    ctx: Arc<AppContext>,
    session: SessionId,
    query: String,
    tx: mpsc::UnboundedSender<ServerFrame>,
) {
    let sessions = ctx.sessions.clone();
    let progress_tx = tx.clone();
    let progress = move |stage: CascadeStage, outcome: &CascadeOutcome| {
        let state = match stage {
            CascadeStage::SearchingLocal => QueryState::SearchingLocal,
            CascadeStage::SearchingInternet => QueryState::SearchingInternet,
        };
        let result = serde_json::to_value(outcome).unwrap_or_default();
        if sessions.update(session, state, result.clone()) {
            let _ = progress_tx.send(ServerFrame::new(state, result));
        }
    };

    let outcome = ctx
        .cascade
        .run_with_progress(&query, &progress)
        .await
        .map_err(|e| e.to_string())
        .and_then(|outcome| serde_json::to_value(outcome).map_err(|e| e.to_string()));
    if let Err(e) = &outcome {
        warn!("Query failed in session {}: {}", session, e);
    }

    // The session is idle once finished; send what was written, not a re-read.
    match ctx.sessions.finish(session, outcome) {
        Some(finished) => {
            let _ = tx.send(ServerFrame::from(&finished));
        }
        None => debug!("Session {} closed before its query finished", session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::offline_context;
    use axum::body::Body;
    use axum::http::Request;
    use bitsift_core::storage::{MediaKind, StoredDocument};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerFrame>) -> Vec<QueryState> {
        let mut states = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            states.push(frame.state);
        }
        states
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir).await;

        let response = router(ctx)
            .oneshot(Request::get("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn test_run_query_ends_with_terminal_frame() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir).await;
        let session = ctx.sessions.open();
        assert!(ctx.sessions.try_begin(session));

        let (tx, mut rx) = mpsc::unbounded_channel();
        run_query(ctx.clone(), session, "hello".into(), tx).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                QueryState::SearchingLocal,
                QueryState::SearchingInternet,
                QueryState::Success
            ]
        );
        assert!(ctx.sessions.get(session).unwrap().state.is_idle());
    }

    #[tokio::test]
    async fn test_closed_session_gets_no_frames() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir).await;
        let session = ctx.sessions.open();
        ctx.sessions.try_begin(session);
        ctx.sessions.close(session);

        let (tx, mut rx) = mpsc::unbounded_channel();
        run_query(ctx.clone(), session, "hello".into(), tx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_back_to_back_queries_each_end_with_success() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir).await;
        let session = ctx.sessions.open();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for query in ["first", "second"] {
            assert!(ctx.sessions.try_begin(session));
            run_query(ctx.clone(), session, query.into(), tx.clone()).await;
        }

        let states = drain(&mut rx);
        let per_query = [
            QueryState::SearchingLocal,
            QueryState::SearchingInternet,
            QueryState::Success,
        ];
        assert_eq!(states, [per_query, per_query].concat());
    }

    #[tokio::test]
    async fn test_document_route() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir).await;
        let mut doc = StoredDocument::new("trip", MediaKind::Article);
        doc.push_fragment("Packed the bags.", "AA==".to_string());
        doc.push_fragment("Arrived late.", "AA==".to_string());
        ctx.indexer.ingest_document(&doc).await.unwrap();

        let response = router(ctx.clone())
            .oneshot(
                Request::get("/api/document/trip_text_2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["document_id"], "trip");
        assert_eq!(json["text"], "Packed the bags.\nArrived late.\n");

        let missing = router(ctx)
            .oneshot(
                Request::get("/api/document/nobody_text_1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
