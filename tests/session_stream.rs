//! End-to-end session tests against a scripted HTTP stream.
//!
//! The server here writes raw chunked-encoding pieces with deliberate
//! fragmentation: event lines split mid-marker, mid-JSON, and interleaved
//! out of order, the way a real network delivers them.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use voxtalk::Config;
use voxtalk::audio::pcm::{self, PcmAudio};
use voxtalk::audio::voice::mock_pool;
use voxtalk::stream::controller::{SessionController, SessionState};
use voxtalk::stream::events::SessionEvent;

/// 10ms of 16kHz mono audio in the wire container, base64 encoded.
fn audio_line(id: u64) -> String {
    let container = pcm::encode(&PcmAudio {
        sample_rate: 16000,
        channels: 1,
        samples: vec![0.1; 160],
    });
    format!(
        "data: {{\"type\":\"audio\",\"sentence_id\":{id},\"text\":\"sentence {id}\",\"audio_data\":\"{}\",\"audio_length\":{}}}\n",
        BASE64.encode(&container),
        container.len()
    )
}

/// Serves one chunked HTTP response, writing each piece as its own chunk
/// with a pause in between so the client really sees the fragmentation.
async fn serve_pieces(pieces: Vec<String>, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 8192];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\ncontent-type: text/event-stream\r\n\r\n",
            )
            .await;
        for piece in pieces {
            let framed = format!("{:x}\r\n{piece}\r\n", piece.len());
            if socket.write_all(framed.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(delay).await;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}/session")
}

async fn collect_events(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        events.push(event);
    }
    events
}

fn started_ids(events: &[SessionEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ChunkStarted { sequence_id, .. } => Some(*sequence_id),
            _ => None,
        })
        .collect()
}

/// Split a string into byte pieces of at most `n` characters, cutting through
/// markers and JSON alike.
fn shatter(s: &str, n: usize) -> Vec<String> {
    s.as_bytes()
        .chunks(n)
        .map(|c| String::from_utf8(c.to_vec()).expect("ascii pieces"))
        .collect()
}

#[tokio::test]
async fn session_plays_text_and_audio_in_order() {
    let endpoint = serve_pieces(
        vec![
            "data: {\"type\":\"text\",\"sentence_id\":1,\"text\":\"Hi\"}\n".to_string(),
            audio_line(1),
            "data: {\"type\":\"complete\",\"total_sentences\":1}\n".to_string(),
        ],
        Duration::from_millis(5),
    )
    .await;

    let mut controller = SessionController::new(Config::default(), std::sync::Arc::new(mock_pool(3)));
    let (mut rx, mut handle) = controller
        .start(&endpoint, "{\"text\":\"hello\"}".to_string())
        .await
        .expect("start");

    assert_eq!(handle.wait_terminal().await, SessionState::Completed);
    let events = collect_events(&mut rx).await;
    assert_eq!(
        events.first(),
        Some(&SessionEvent::TextGenerated {
            sequence_id: 1,
            text: "Hi".to_string()
        })
    );
    assert_eq!(started_ids(&events), vec![1]);
    assert_eq!(
        events.last(),
        Some(&SessionEvent::AllCompleted { chunks_played: 1 })
    );
}

#[tokio::test]
async fn fragmented_out_of_order_stream_plays_sequentially() {
    // Four audio events delivered 3-1-4-2, the whole byte stream shattered
    // into 40-byte fragments so markers and JSON split arbitrarily.
    let mut wire = String::new();
    for id in [3u64, 1, 4, 2] {
        wire.push_str(&audio_line(id));
    }
    wire.push_str("data: {\"type\":\"complete\",\"total_sentences\":4}\n");
    let endpoint = serve_pieces(shatter(&wire, 40), Duration::from_millis(1)).await;

    let mut controller = SessionController::new(Config::default(), std::sync::Arc::new(mock_pool(3)));
    let (mut rx, mut handle) = controller
        .start(&endpoint, "{}".to_string())
        .await
        .expect("start");

    assert_eq!(handle.wait_terminal().await, SessionState::Completed);
    let events = collect_events(&mut rx).await;
    assert_eq!(started_ids(&events), vec![1, 2, 3, 4]);
    assert_eq!(
        events.last(),
        Some(&SessionEvent::AllCompleted { chunks_played: 4 })
    );
}

#[tokio::test]
async fn noise_between_events_is_ignored() {
    let endpoint = serve_pieces(
        vec![
            ": keepalive\n\n".to_string(),
            audio_line(1),
            "event: ping\n".to_string(),
            "data: {\"type\":\"complete\"}\n".to_string(),
        ],
        Duration::from_millis(5),
    )
    .await;

    let mut controller = SessionController::new(Config::default(), std::sync::Arc::new(mock_pool(3)));
    let (mut rx, mut handle) = controller
        .start(&endpoint, "{}".to_string())
        .await
        .expect("start");

    assert_eq!(handle.wait_terminal().await, SessionState::Completed);
    let events = collect_events(&mut rx).await;
    assert_eq!(started_ids(&events), vec![1]);
}

#[tokio::test]
async fn missing_chunk_is_skipped_after_bounded_wait() {
    // Chunk 2 never arrives; playback must not stall behind it forever.
    let mut config = Config::default();
    config.buffer.missing_chunk_wait_ms = 100;
    let endpoint = serve_pieces(
        vec![
            audio_line(1),
            audio_line(3),
            "data: {\"type\":\"complete\",\"total_sentences\":3}\n".to_string(),
        ],
        Duration::from_millis(5),
    )
    .await;

    let mut controller = SessionController::new(config, std::sync::Arc::new(mock_pool(3)));
    let (mut rx, mut handle) = controller
        .start(&endpoint, "{}".to_string())
        .await
        .expect("start");

    assert_eq!(handle.wait_terminal().await, SessionState::Completed);
    let events = collect_events(&mut rx).await;
    assert_eq!(started_ids(&events), vec![1, 3]);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::Warning { .. })),
        "the skip is surfaced as a warning"
    );
    // Only chunks actually played are counted.
    assert_eq!(
        events.last(),
        Some(&SessionEvent::AllCompleted { chunks_played: 2 })
    );
}
