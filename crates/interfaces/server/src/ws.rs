use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agentrun_llm::StreamSink;

use crate::state::AppState;

/// Per-connection backpressure buffer, per the "bounded per-connection
/// buffer" requirement — a stalled client gets disconnected rather than
/// letting the orchestrator's output pile up unboundedly in memory.
const STREAM_CHANNEL_CAPACITY: usize = 32;
const SLOW_CONSUMER_CLOSE_REASON: &str = "slow consumer";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutgoingMessage {
    Chunk { content: String },
    End { tokens_used: agentrun_llm::TokenUsage, tool_calls: usize, tool_results: usize },
    Error { message: String },
}

pub async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<WsQuery>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: Uuid) {
    loop {
        let Some(Ok(message)) = socket.recv().await else { return };
        let Message::Text(raw) = message else { continue };

        let incoming: IncomingMessage = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                let _ = send(&mut socket, &OutgoingMessage::Error { message: e.to_string() }).await;
                continue;
            }
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
        let overflowed = Arc::new(AtomicBool::new(false));
        let mut sink = ChannelSink { tx, overflowed: overflowed.clone() };

        let run = state.orchestrator.run_turn_streaming(session_id, &incoming.content, &mut sink);
        tokio::pin!(run);

        loop {
            if overflowed.load(Ordering::Relaxed) {
                close_slow_consumer(&mut socket).await;
                return;
            }

            tokio::select! {
                chunk = rx.recv() => {
                    match chunk {
                        Some(content) => {
                            if send(&mut socket, &OutgoingMessage::Chunk { content }).await.is_err() {
                                return;
                            }
                        }
                        None if overflowed.load(Ordering::Relaxed) => {
                            close_slow_consumer(&mut socket).await;
                            return;
                        }
                        None => break,
                    }
                }
                outcome = &mut run => {
                    match outcome {
                        Ok(outcome) => {
                            let _ = send(&mut socket, &OutgoingMessage::End {
                                tokens_used: outcome.tokens_used,
                                tool_calls: outcome.tool_calls.len(),
                                tool_results: outcome.tool_results.len(),
                            }).await;
                        }
                        Err(e) => {
                            let _ = send(&mut socket, &OutgoingMessage::Error { message: e.to_string() }).await;
                        }
                    }
                    break;
                }
            }
        }
    }
}

async fn close_slow_consumer(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: axum::extract::ws::close_code::AWAY,
            reason: SLOW_CONSUMER_CLOSE_REASON.into(),
        })))
        .await;
}

async fn send(socket: &mut WebSocket, message: &OutgoingMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string());
    socket.send(Message::Text(text.into())).await
}

/// Forwards chunks from the orchestrator's synchronous [`StreamSink`]
/// callback onto a bounded channel, which the socket loop above drains
/// asynchronously and writes out as `chunk` frames. `push` can't await, so a
/// full channel (the client isn't draining fast enough) sets `overflowed`
/// instead of blocking or growing the buffer; the socket loop notices the
/// flag and closes with a "slow consumer" reason.
struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<String>,
    overflowed: Arc<AtomicBool>,
}

impl StreamSink for ChannelSink {
    fn push(&mut self, chunk: String) {
        if self.tx.try_send(chunk).is_err() {
            self.overflowed.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serializes_with_snake_case_tag() {
        let msg = OutgoingMessage::Chunk { content: "hi".to_string() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"type": "chunk", "content": "hi"}));
    }

    #[test]
    fn end_serializes_tool_counts() {
        let msg = OutgoingMessage::End { tokens_used: agentrun_llm::TokenUsage::default(), tool_calls: 2, tool_results: 2 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["tool_calls"], 2);
        assert_eq!(json["tool_results"], 2);
    }

    #[test]
    fn channel_sink_forwards_chunks_to_the_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
        let overflowed = Arc::new(AtomicBool::new(false));
        let mut sink = ChannelSink { tx, overflowed: overflowed.clone() };
        sink.push("a".to_string());
        sink.push("b".to_string());
        drop(sink);

        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
        assert!(rx.try_recv().is_err());
        assert!(!overflowed.load(Ordering::Relaxed));
    }

    #[test]
    fn channel_sink_marks_overflow_when_the_consumer_cannot_keep_up() {
        let (tx, rx) = tokio::sync::mpsc::channel::<String>(1);
        let overflowed = Arc::new(AtomicBool::new(false));
        let mut sink = ChannelSink { tx, overflowed: overflowed.clone() };

        sink.push("a".to_string());
        sink.push("b".to_string());

        assert!(overflowed.load(Ordering::Relaxed));
        drop(rx);
    }

    #[test]
    fn incoming_message_deserializes_from_plain_content() {
        let incoming: IncomingMessage = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(incoming.content, "hello");
    }
}
