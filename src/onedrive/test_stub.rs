//! Shared test support: a scripted HTTP responder on a local socket plus
//! ready-made config / session fixtures.

use crate::onedrive::types::{BearerToken, Config, RetryPolicy, SessionContext};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One observed request.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub content_range: Option<String>,
    pub body: Vec<u8>,
}

/// Serve one scripted JSON `(status, body)` response per connection.
pub fn serve_script(
    listener: TcpListener,
    script: Vec<(u16, String)>,
    log: Arc<Mutex<Vec<Recorded>>>,
) -> tokio::task::JoinHandle<()> {
    let script = script
        .into_iter()
        .map(|(status, body)| {
            (
                status,
                vec!["Content-Type: application/json".to_string()],
                body.into_bytes(),
            )
        })
        .collect();
    serve_script_with_headers(listener, script, log)
}

/// Serve one scripted `(status, extra headers, body)` response per
/// connection, in order, and record what each request carried.
/// Connections are closed after every response so the client cannot
/// pool them.
pub fn serve_script_with_headers(
    listener: TcpListener,
    script: Vec<(u16, Vec<String>, Vec<u8>)>,
    log: Arc<Mutex<Vec<Recorded>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for (status, extra_headers, body) in script {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };

            let Some(recorded) = read_request(&mut sock).await else {
                return;
            };
            log.lock().unwrap().push(recorded);

            let reason = match status {
                200 => "OK",
                201 => "Created",
                202 => "Accepted",
                404 => "Not Found",
                503 => "Service Unavailable",
                _ => "Other",
            };
            let mut resp = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                status,
                reason,
                body.len()
            );
            for h in &extra_headers {
                resp.push_str(h);
                resp.push_str("\r\n");
            }
            resp.push_str("\r\n");
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.write_all(&body).await;
            let _ = sock.shutdown().await;
        }
    })
}

/// Read one HTTP/1.1 request off the socket.
async fn read_request(sock: &mut tokio::net::TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let header_end = loop {
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().to_string();
    let mut content_length = 0usize;
    let mut content_range = None;
    for line in lines {
        let lower = line.to_ascii_lowercase();
        if let Some(v) = lower.strip_prefix("content-length:") {
            content_length = v.trim().parse().unwrap_or(0);
        }
        if lower.starts_with("content-range:") {
            content_range = Some(line[14..].trim().to_string());
        }
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }

    let mut parts = request_line.split_whitespace();
    Some(Recorded {
        method: parts.next().unwrap_or_default().to_string(),
        path: parts.next().unwrap_or_default().to_string(),
        content_range,
        body,
    })
}

/// Config pointed at a local stub, with short test-friendly delays.
pub fn test_config(base_url: &str) -> Config {
    Config {
        graph_base_url: base_url.to_string(),
        chunk_retry_delay_ms: 10,
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1,
        },
        ..Default::default()
    }
}

/// A fully resolved session for tests.
pub fn resolved_ctx() -> SessionContext {
    SessionContext {
        token: BearerToken {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        },
        user_id: "u1".into(),
        drive_id: "d1".into(),
        folder_id: "f1".into(),
        folder_name: "sqlite".into(),
    }
}
