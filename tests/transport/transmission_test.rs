//! Transmission RPC wire format and session handshake tests.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use torrent_quota::config::TransmissionConfig;
use torrent_quota::transport::transmission::{
    build_request, parse_response, session_stats_from, torrents_from, TransmissionClient,
};
use torrent_quota::transport::{TorrentStatus, TransferTotals, Transport, TransportError};

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

#[test]
fn build_request_omits_null_arguments() {
    let body = serde_json::to_value(build_request("session-stats", Value::Null)).expect("json");
    assert_eq!(body, json!({ "method": "session-stats" }));

    let body = serde_json::to_value(build_request("torrent-stop", json!({ "ids": [3] })))
        .expect("json");
    assert_eq!(body, json!({ "method": "torrent-stop", "arguments": { "ids": [3] } }));
}

#[test]
fn parse_response_returns_arguments_on_success() {
    let args = parse_response(
        "session-get",
        r#"{"result":"success","arguments":{"version":"4.0.5"}}"#,
    )
    .expect("parse");
    assert_eq!(args["version"], "4.0.5");
}

#[test]
fn parse_response_without_arguments_is_null() {
    let args = parse_response("torrent-start", r#"{"result":"success"}"#).expect("parse");
    assert!(args.is_null());
}

#[test]
fn parse_response_reports_rpc_failure() {
    let err = parse_response("torrent-stop", r#"{"result":"invalid argument"}"#)
        .expect_err("should fail");
    match err {
        TransportError::Rpc { method, result } => {
            assert_eq!(method, "torrent-stop");
            assert_eq!(result, "invalid argument");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn parse_response_rejects_non_json() {
    let err = parse_response("session-stats", "<html>nope</html>").expect_err("should fail");
    assert!(matches!(err, TransportError::Parse(_)));
}

#[test]
fn session_stats_reads_cumulative_counters() {
    let stats = session_stats_from(json!({
        "activeTorrentCount": 3,
        "pausedTorrentCount": 1,
        "cumulative-stats": { "downloadedBytes": 1000, "uploadedBytes": 234, "filesAdded": 9 },
        "current-stats": { "downloadedBytes": 1, "uploadedBytes": 2 }
    }))
    .expect("stats");

    assert_eq!(stats.active_torrent_count, 3);
    assert_eq!(
        stats.cumulative,
        TransferTotals {
            downloaded_bytes: 1000,
            uploaded_bytes: 234
        }
    );
    assert_eq!(stats.cumulative.total(), 1234);
}

#[test]
fn session_stats_missing_counters_is_parse_error() {
    let err = session_stats_from(json!({ "activeTorrentCount": 1 })).expect_err("should fail");
    assert!(matches!(err, TransportError::Parse(_)));
}

#[test]
fn torrents_map_status_codes() {
    let torrents = torrents_from(json!({
        "torrents": [
            { "id": 1, "status": 4 },
            { "id": 2, "status": 6 },
            { "id": 3, "status": 0 },
            { "id": 4, "status": 42 }
        ]
    }))
    .expect("torrents");

    let statuses: Vec<TorrentStatus> = torrents.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![
            TorrentStatus::Downloading,
            TorrentStatus::Seeding,
            TorrentStatus::Stopped,
            TorrentStatus::Unknown(42),
        ]
    );
    assert!(torrents[0].status.is_downloading());
    assert!(!torrents[1].status.is_downloading());
}

#[test]
fn totals_saturate_instead_of_overflowing() {
    let totals = TransferTotals {
        downloaded_bytes: u64::MAX,
        uploaded_bytes: 10,
    };
    assert_eq!(totals.total(), u64::MAX);
}

#[test]
fn client_debug_redacts_password() {
    let config = TransmissionConfig {
        username: Some("admin".to_owned()),
        password: Some("hunter2".to_owned()),
        ..TransmissionConfig::default()
    };
    let client = TransmissionClient::new(&config).expect("client");
    let debug = format!("{client:?}");
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("__REDACTED__"));
    assert_eq!(client.url(), "http://127.0.0.1:9091/transmission/rpc");
}

// ---------------------------------------------------------------------------
// Fake daemon
// ---------------------------------------------------------------------------

const SESSION_ID: &str = "0123456789abcdef";

/// A request as received by the fake daemon: lowercased head and JSON body.
#[derive(Debug, Clone)]
struct SeenRequest {
    head: String,
    body: Value,
}

impl SeenRequest {
    fn method(&self) -> &str {
        self.body["method"].as_str().unwrap_or_default()
    }

    fn has_session_id(&self) -> bool {
        self.head
            .contains(&format!("x-transmission-session-id: {SESSION_ID}"))
    }
}

async fn read_request(stream: &mut TcpStream) -> SeenRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.expect("read");
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.expect("read body");
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = serde_json::from_slice(&buf[head_end..head_end + content_length])
        .unwrap_or(Value::Null);
    SeenRequest { head, body }
}

async fn write_response(stream: &mut TcpStream, status: &str, extra: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{extra}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.expect("write");
    stream.shutdown().await.ok();
}

fn reply_for(method: &str, session: &Value) -> Value {
    match method {
        "session-get" => json!({ "result": "success", "arguments": session }),
        "session-stats" => json!({
            "result": "success",
            "arguments": {
                "activeTorrentCount": 2,
                "cumulative-stats": { "downloadedBytes": 5000, "uploadedBytes": 700 }
            }
        }),
        "torrent-get" => json!({
            "result": "success",
            "arguments": { "torrents": [{ "id": 1, "status": 4 }, { "id": 2, "status": 6 }] }
        }),
        _ => json!({ "result": "success", "arguments": {} }),
    }
}

/// Serve Transmission-style replies, demanding the session id first.
async fn spawn_daemon() -> (TransmissionConfig, Arc<Mutex<Vec<SeenRequest>>>) {
    spawn_daemon_with(json!({ "version": "4.0.5" })).await
}

/// Like [`spawn_daemon`], answering `session-get` with `session`.
async fn spawn_daemon_with(session: Value) -> (TransmissionConfig, Arc<Mutex<Vec<SeenRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            log.lock().expect("log lock").push(request.clone());

            if request.has_session_id() {
                let body = reply_for(request.method(), &session).to_string();
                write_response(&mut stream, "200 OK", "", &body).await;
            } else {
                let extra = format!("X-Transmission-Session-Id: {SESSION_ID}\r\n");
                write_response(&mut stream, "409 Conflict", &extra, "<h1>409: Conflict</h1>")
                    .await;
            }
        }
    });

    let config = TransmissionConfig {
        port,
        username: Some("admin".to_owned()),
        password: Some("secret".to_owned()),
        timeout_secs: 5,
        ..TransmissionConfig::default()
    };
    (config, seen)
}

#[tokio::test]
async fn connect_retries_after_session_conflict() {
    let (config, seen) = spawn_daemon().await;

    let client = TransmissionClient::connect(&config).await.expect("connect");
    let stats = client.session_stats().await.expect("stats");

    assert_eq!(stats.active_torrent_count, 2);
    assert_eq!(stats.cumulative.total(), 5700);

    let seen = seen.lock().expect("log lock").clone();
    let methods: Vec<&str> = seen.iter().map(SeenRequest::method).collect();
    assert_eq!(methods, vec!["session-get", "session-get", "session-stats"]);
    assert!(!seen[0].has_session_id());
    assert!(seen[1].has_session_id());
    assert!(seen[2].has_session_id());
    // admin:secret
    assert!(seen
        .iter()
        .all(|r| r.head.contains("authorization: basic ywrtaw46c2vjcmv0")));
}

#[tokio::test]
async fn connect_accepts_session_without_version() {
    let (config, seen) = spawn_daemon_with(json!({ "rpc-version": 17 })).await;

    let client = TransmissionClient::connect(&config).await.expect("connect");

    assert_eq!(client.url(), format!("http://127.0.0.1:{}/transmission/rpc", config.port));
    let seen = seen.lock().expect("log lock").clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[1].body["arguments"]["fields"],
        json!(["version", "rpc-version"])
    );
}

#[tokio::test]
async fn torrent_calls_send_ids_and_flags() {
    let (config, seen) = spawn_daemon().await;
    let client = TransmissionClient::connect(&config).await.expect("connect");

    let torrents = client.list_torrents().await.expect("list");
    assert_eq!(torrents.len(), 2);
    client.stop_torrent(2).await.expect("stop");
    client.reannounce_torrent(1).await.expect("reannounce");
    client.set_start_added_torrents(false).await.expect("session-set");

    let seen = seen.lock().expect("log lock").clone();
    let tail: Vec<Value> = seen.iter().skip(2).map(|r| r.body.clone()).collect();
    assert_eq!(tail[0]["method"], "torrent-get");
    assert_eq!(tail[0]["arguments"]["fields"], json!(["id", "status"]));
    assert_eq!(tail[1], json!({ "method": "torrent-stop", "arguments": { "ids": [2] } }));
    assert_eq!(
        tail[2],
        json!({ "method": "torrent-reannounce", "arguments": { "ids": [1] } })
    );
    assert_eq!(
        tail[3],
        json!({ "method": "session-set", "arguments": { "start-added-torrents": false } })
    );
}

#[tokio::test]
async fn unreachable_daemon_is_a_request_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let config = TransmissionConfig {
        port,
        timeout_secs: 2,
        ..TransmissionConfig::default()
    };
    let err = TransmissionClient::connect(&config)
        .await
        .expect_err("should fail");
    assert!(matches!(err, TransportError::Request(_)));
}
