//! Integration tests for the remote enrichment path, against loopback HTTP
//! fixtures. Every failure mode must come back as `Unavailable`, never as an
//! error or a hang past the deadline.
//!
//! Run with:
//!   cargo test --test test_remote

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use netenrich::annotation::MemoryAnnotations;
use netenrich::config::RemoteConfig;
use netenrich::enrich::{EnrichmentEngine, RemoteEnricher, RemoteEnrichment};

// ── fixtures ─────────────────────────────────────────────────────────────────

fn remote_config(addr: SocketAddr, min_interval: Duration) -> RemoteConfig {
    RemoteConfig {
        api_base_url: format!("http://{addr}/api/gost/profile/"),
        organism: "hsapiens".into(),
        timeout: Duration::from_secs(5),
        min_interval,
    }
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn http_ok(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn http_error(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Drain one HTTP request: headers plus the announced body length.
async fn read_request(socket: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);
        let Some(split) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&data[..split]).to_ascii_lowercase();
        let body_len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= split + 4 + body_len {
            return;
        }
    }
}

/// Serve each canned response to one connection, in order, then stop.
async fn spawn_server(responses: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut socket).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    addr
}

/// Accepts a connection, reads the request, then never answers.
async fn spawn_hung_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(socket);
    });
    addr
}

const TWO_TERM_BODY: &str = r#"{
  "result": [
    {
      "native": "GO:0008150",
      "name": "biological process",
      "p_value": 0.04,
      "term_size": 17000,
      "query_size": 3,
      "intersection_size": 3,
      "effective_domain_size": 20000,
      "intersections": ["TP53", "BRCA1", "EGFR"]
    },
    {
      "native": "GO:0006915",
      "name": "apoptotic process",
      "p_value": 0.001,
      "term_size": 180,
      "query_size": 3,
      "intersection_size": 2,
      "effective_domain_size": 20000,
      "intersections": ["TP53", "BRCA1"]
    }
  ]
}"#;

// ── success path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn results_arrive_parsed_and_sorted() {
    let addr = spawn_server(vec![http_ok(TWO_TERM_BODY)]).await;
    let config = remote_config(addr, Duration::from_millis(10));
    let engine = EnrichmentEngine::new(Arc::new(MemoryAnnotations::new("v1")))
        .with_remote(Arc::new(RemoteEnricher::new(&config).unwrap()));

    let outcome = engine
        .enrich_remote(
            &symbols(&["TP53", "BRCA1", "EGFR"]),
            "GO:BP",
            Duration::from_secs(5),
        )
        .await;

    let results = match outcome {
        RemoteEnrichment::Ready(results) => results,
        RemoteEnrichment::Unavailable { reason } => panic!("unavailable: {reason}"),
    };
    assert_eq!(results.len(), 2);
    // Sorted by corrected value, not by wire order.
    assert_eq!(results[0].term_id.as_str(), "GO:0006915");
    assert_eq!(results[0].term_name.as_deref(), Some("apoptotic process"));
    assert_eq!(results[0].fdr, 0.001);
    assert_eq!(results[0].overlap_count, 2);
    assert_eq!(results[0].matched_entities.len(), 2);
    assert_eq!(results[1].term_id.as_str(), "GO:0008150");
    assert_eq!(results[1].universe_size, 20000);
}

#[tokio::test]
async fn empty_result_lists_are_ready_not_unavailable() {
    let addr = spawn_server(vec![http_ok(r#"{"result": []}"#)]).await;
    let config = remote_config(addr, Duration::from_millis(10));
    let enricher = RemoteEnricher::new(&config).unwrap();

    let outcome = enricher
        .enrich(&symbols(&["TP53"]), "GO:BP", Duration::from_secs(5))
        .await;
    assert_eq!(outcome, RemoteEnrichment::Ready(Vec::new()));
}

// ── degraded paths ───────────────────────────────────────────────────────────

#[tokio::test]
async fn server_errors_degrade_to_unavailable() {
    let addr = spawn_server(vec![http_error(
        "500 Internal Server Error",
        "upstream exploded",
    )])
    .await;
    let config = remote_config(addr, Duration::from_millis(10));
    let enricher = RemoteEnricher::new(&config).unwrap();

    let outcome = enricher
        .enrich(&symbols(&["TP53"]), "GO:BP", Duration::from_secs(5))
        .await;
    match outcome {
        RemoteEnrichment::Unavailable { reason } => {
            assert!(reason.contains("500"), "reason was: {reason}");
        }
        RemoteEnrichment::Ready(_) => panic!("expected unavailable"),
    }
}

#[tokio::test]
async fn undecodable_bodies_degrade_to_unavailable() {
    let addr = spawn_server(vec![http_ok("this is not json")]).await;
    let config = remote_config(addr, Duration::from_millis(10));
    let enricher = RemoteEnricher::new(&config).unwrap();

    let outcome = enricher
        .enrich(&symbols(&["TP53"]), "GO:BP", Duration::from_secs(5))
        .await;
    assert!(outcome.is_unavailable());
}

#[tokio::test]
async fn refused_connections_degrade_to_unavailable() {
    // Bind to learn a free port, then close it before the call.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = remote_config(addr, Duration::from_millis(10));
    let enricher = RemoteEnricher::new(&config).unwrap();
    let outcome = enricher
        .enrich(&symbols(&["TP53"]), "GO:BP", Duration::from_secs(5))
        .await;
    assert!(outcome.is_unavailable());
}

#[tokio::test]
async fn hung_service_is_cut_at_the_deadline() {
    let addr = spawn_hung_server().await;
    let config = remote_config(addr, Duration::from_millis(10));
    let enricher = RemoteEnricher::new(&config).unwrap();

    let started = Instant::now();
    let outcome = enricher
        .enrich(&symbols(&["TP53"]), "GO:BP", Duration::from_secs(1))
        .await;
    let elapsed = started.elapsed();

    match outcome {
        RemoteEnrichment::Unavailable { reason } => {
            assert!(reason.contains("timed out"), "reason was: {reason}");
        }
        RemoteEnrichment::Ready(_) => panic!("expected unavailable"),
    }
    assert!(elapsed >= Duration::from_millis(900), "cut too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "deadline ignored: {elapsed:?}");
}

// ── rate limiting ────────────────────────────────────────────────────────────

#[tokio::test]
async fn consecutive_calls_keep_their_distance() {
    let addr = spawn_server(vec![
        http_ok(r#"{"result": []}"#),
        http_ok(r#"{"result": []}"#),
    ])
    .await;
    let config = remote_config(addr, Duration::from_millis(300));
    let enricher = RemoteEnricher::new(&config).unwrap();

    let started = Instant::now();
    let first = enricher
        .enrich(&symbols(&["TP53"]), "GO:BP", Duration::from_secs(5))
        .await;
    let second = enricher
        .enrich(&symbols(&["BRCA1"]), "GO:BP", Duration::from_secs(5))
        .await;
    let elapsed = started.elapsed();

    assert!(!first.is_unavailable());
    assert!(!second.is_unavailable());
    assert!(
        elapsed >= Duration::from_millis(300),
        "second call started early: {elapsed:?}"
    );
}
