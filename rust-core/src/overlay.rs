//! Read-only HTTP view of the latest websocket events, for browser overlays
//! (the donation goal bar) that poll instead of holding a socket open.

use crate::host::EventListener;
use hex::encode as hex_encode;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// Latest payload per event name.
#[derive(Clone, Default)]
pub struct OverlayBoard {
    events: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl OverlayBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload; non-JSON payloads are kept as strings.
    pub fn record(&self, event: &str, payload: &str) {
        let value = serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
        let mut events = self.events.write().unwrap_or_else(|p| p.into_inner());
        events.insert(event.to_string(), value);
    }

    pub fn get(&self, event: &str) -> Option<Value> {
        let events = self.events.read().unwrap_or_else(|p| p.into_inner());
        events.get(event).cloned()
    }

    pub fn snapshot(&self) -> Value {
        let events = self.events.read().unwrap_or_else(|p| p.into_inner());
        let map: Map<String, Value> = events.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Value::Object(map)
    }

    /// Hook for `MemoryHost::set_event_listener`.
    pub fn listener(&self) -> EventListener {
        let board = self.clone();
        Arc::new(move |event: &str, payload: &str| board.record(event, payload))
    }
}

/// Bind and serve in a background thread. Returns the bound address
/// (useful with port 0).
pub fn start_overlay_server(listen_addr: &str, board: OverlayBoard) -> io::Result<SocketAddr> {
    let listener = TcpListener::bind(listen_addr)?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "overlay server listening");
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let board = board.clone();
                    thread::spawn(move || handle_client(stream, board));
                }
                Err(err) => tracing::warn!(error = %err, "overlay accept failed"),
            }
        }
    });
    Ok(local)
}

fn handle_client(mut stream: TcpStream, board: OverlayBoard) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let req = match read_request(&mut stream) {
        Ok(r) => r,
        Err(err) => {
            tracing::debug!(error = %err, "dropping malformed overlay request");
            return;
        }
    };

    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/events") => {
            let body = board.snapshot().to_string();
            write_json(&mut stream, 200, &body);
        }
        ("GET", path) if path.starts_with("/events/") => {
            let name = path.trim_start_matches("/events/");
            match board.get(name) {
                Some(value) => write_json(&mut stream, 200, &value.to_string()),
                None => write_json(&mut stream, 404, r#"{"error":"unknown event"}"#),
            }
        }
        ("GET", _) => write_json(&mut stream, 404, r#"{"error":"not found"}"#),
        _ => write_json(&mut stream, 405, r#"{"error":"method not allowed"}"#),
    }
}

struct Request {
    method: String,
    path: String,
}

fn read_request(stream: &mut TcpStream) -> Result<Request, String> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf).map_err(|e| format!("{}", e))?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.windows(4).any(|w| w == b"\r\n\r\n") || data.len() > 16 * 1024 {
            break;
        }
    }

    let req_str = String::from_utf8_lossy(&data);
    let line = req_str.split("\r\n").next().ok_or("bad request")?;
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or("bad method")?.to_string();
    let path = parts.next().ok_or("bad path")?.to_string();
    Ok(Request { method, path })
}

/// Hex SHA-256 of the body, quoted as an HTTP entity tag.
pub fn etag(body: &str) -> String {
    let mut h = Sha256::new();
    h.update(body.as_bytes());
    format!("\"{}\"", hex_encode(h.finalize()))
}

fn write_json(stream: &mut TcpStream, status: u16, body: &str) {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let resp = format!(
        "{}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nETag: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        etag(body),
        body.len(),
        body
    );
    let _ = stream.write_all(resp.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_keeps_latest_payload_per_event() {
        let board = OverlayBoard::new();
        board.record("EVENT_DONATION", r#"{"progress":10}"#);
        board.record("EVENT_DONATION", r#"{"progress":20}"#);
        board.record("EVENT_OTHER", "plain text");
        assert_eq!(board.get("EVENT_DONATION").unwrap()["progress"], 20);
        assert_eq!(board.get("EVENT_OTHER").unwrap(), Value::String("plain text".into()));
        assert_eq!(board.snapshot().as_object().unwrap().len(), 2);
    }

    #[test]
    fn listener_feeds_board() {
        let board = OverlayBoard::new();
        let listener = board.listener();
        listener("E", "1");
        assert_eq!(board.get("E").unwrap(), Value::from(1));
    }

    #[test]
    fn etag_is_stable_hex_digest() {
        let tag = etag("{}");
        assert_eq!(tag.len(), 66);
        assert_eq!(tag, etag("{}"));
        assert_ne!(tag, etag("{ }"));
    }
}
