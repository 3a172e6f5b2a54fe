//! Realtime change feed over the hosted backend's Phoenix-channel websocket.
//!
//! One socket per subscription. The socket task forwards decoded
//! `postgres_changes` frames into a bounded channel and exits when the
//! receiving `ChangeStream` is dropped or the server closes the socket.
//! Nothing is replayed or reordered.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{BackendError, Filter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const CHANNEL_CAPACITY: usize = 64;
const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row-level change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
    pub commit_timestamp: Option<String>,
}

/// Receiving end of a subscription. Dropping it closes the feed.
pub struct ChangeStream {
    rx: mpsc::Receiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl ChangeStream {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Next change, or `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Change(ChangeEvent),
    JoinRejected(String),
    Closed,
    Other,
}

/// `https://x.supabase.co` → `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn socket_url(base_url: &str, api_key: &str) -> Result<String, BackendError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(BackendError::Realtime(format!(
            "unsupported backend URL scheme: {base_url}"
        )));
    };
    Ok(format!(
        "{ws_base}/realtime/v1/websocket?apikey={}&vsn={PROTOCOL_VERSION}",
        urlencoding::encode(api_key)
    ))
}

fn join_message(topic: &str, table: &str, filter: Option<&Filter>, token: &str) -> Value {
    let mut change = json!({ "event": "*", "schema": "public", "table": table });
    if let Some(filter) = filter {
        change["filter"] = Value::String(filter.realtime_expr());
    }
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change]
            },
            "access_token": token
        },
        "ref": "1",
        "join_ref": "1"
    })
}

fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string()
    })
}

fn parse_frame(text: &str) -> Frame {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return Frame::Other;
    };
    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default();
    let payload = frame.get("payload").cloned().unwrap_or(Value::Null);

    match event {
        "postgres_changes" => {
            let data = payload.get("data").cloned().unwrap_or(Value::Null);
            let kind = match data.get("type").and_then(Value::as_str) {
                Some("INSERT") => ChangeKind::Insert,
                Some("UPDATE") => ChangeKind::Update,
                Some("DELETE") => ChangeKind::Delete,
                _ => return Frame::Other,
            };
            let non_empty = |key: &str| {
                data.get(key)
                    .filter(|v| v.as_object().map(|o| !o.is_empty()).unwrap_or(false))
                    .cloned()
            };
            Frame::Change(ChangeEvent {
                table: data
                    .get("table")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind,
                record: non_empty("record"),
                old_record: non_empty("old_record"),
                commit_timestamp: data
                    .get("commit_timestamp")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        "phx_reply" if payload.get("status").and_then(Value::as_str) == Some("error") => {
            Frame::JoinRejected(
                payload
                    .get("response")
                    .map(Value::to_string)
                    .unwrap_or_else(|| "unknown".to_string()),
            )
        }
        "phx_close" | "phx_error" => Frame::Closed,
        _ => Frame::Other,
    }
}

/// Opens a socket, joins the table's change channel and spawns the pump task.
pub async fn subscribe(
    base_url: &str,
    api_key: &str,
    token: &str,
    table: &str,
    filter: Option<Filter>,
) -> Result<ChangeStream, BackendError> {
    let url = socket_url(base_url, api_key)?;
    let (socket, _) = connect_async(url.as_str())
        .await
        .map_err(|e| BackendError::Realtime(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    let topic = format!("realtime:{table}");
    let join = join_message(&topic, table, filter.as_ref(), token);
    sink.send(Message::Text(join.to_string()))
        .await
        .map_err(|e| BackendError::Realtime(e.to_string()))?;

    info!(table, filter = ?filter.as_ref().map(Filter::realtime_expr), "Realtime channel joined");

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let table_name = table.to_string();
    let task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut msg_ref: u64 = 1;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    msg_ref += 1;
                    let beat = heartbeat_message(msg_ref).to_string();
                    if let Err(e) = sink.send(Message::Text(beat)).await {
                        warn!(table = %table_name, error = %e, "Realtime heartbeat failed");
                        break;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Frame::Change(event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Frame::JoinRejected(reason) => {
                            warn!(table = %table_name, %reason, "Realtime join rejected");
                            break;
                        }
                        Frame::Closed => break,
                        Frame::Other => {}
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            warn!(table = %table_name, error = %e, "Realtime pong failed");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(table = %table_name, error = %e, "Realtime socket error");
                        break;
                    }
                },
                _ = tx.closed() => break,
            }
        }

        debug!(table = %table_name, "Realtime feed closed");
    });

    Ok(ChangeStream::new(rx, Some(task)))
}
