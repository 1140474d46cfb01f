//! Stream transport: one long-lived POST whose response body arrives as raw
//! byte fragments.
//!
//! The transport never parses messages — it forwards fragments in arrival
//! order and reports connection establishment, closure, and failure. A single
//! connection means arrival order equals send order, but message boundaries
//! are not aligned to delivery boundaries; the decoder deals with that.

use crate::error::VoxtalkError;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events delivered by a running transport, in order: at most one
/// `Connected`, any number of `Bytes`, then exactly one of `Closed`/`Failed`
/// (unless cancelled first — cancellation guarantees silence afterwards).
#[derive(Debug)]
pub enum TransportEvent {
    /// The response headers arrived with a success status.
    Connected,
    /// One raw fragment of the response body.
    Bytes(Vec<u8>),
    /// The server closed the stream normally.
    Closed,
    /// Connection establishment or mid-stream I/O failed. Fatal; never
    /// retried here.
    Failed(VoxtalkError),
}

/// Handle to an open transport.
pub struct TransportHandle {
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Aborts the transfer. No further events are delivered after this
    /// returns. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Stream transport bound to one endpoint.
pub struct StreamTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl StreamTransport {
    /// Builds a transport with the given overall request timeout.
    ///
    /// The timeout bounds the entire exchange, headers through last byte.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, VoxtalkError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VoxtalkError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            timeout_secs: request_timeout.as_secs(),
        })
    }

    /// Opens the stream with an opaque JSON request body.
    ///
    /// Fragments arrive on the returned channel as `TransportEvent`s. The
    /// parent token cancels the transfer; the returned handle does too.
    pub fn open(
        &self,
        body: String,
        parent: &CancellationToken,
        channel_size: usize,
    ) -> (mpsc::Receiver<TransportEvent>, TransportHandle) {
        let (tx, rx) = mpsc::channel(channel_size);
        let cancel = parent.child_token();
        let task_cancel = cancel.clone();
        let request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let endpoint = self.endpoint.clone();
        let timeout_secs = self.timeout_secs;

        tokio::spawn(async move {
            run_transfer(request, endpoint, timeout_secs, tx, task_cancel).await;
        });

        (rx, TransportHandle { cancel })
    }
}

async fn run_transfer(
    request: reqwest::RequestBuilder,
    endpoint: String,
    timeout_secs: u64,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        r = request.send() => r,
    };

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            let _ = tx
                .send(TransportEvent::Failed(classify(&endpoint, timeout_secs, e)))
                .await;
            return;
        }
    };

    if !response.status().is_success() {
        let _ = tx
            .send(TransportEvent::Failed(VoxtalkError::Connect {
                endpoint,
                message: format!("server answered {}", response.status()),
            }))
            .await;
        return;
    }

    if tx.send(TransportEvent::Connected).await.is_err() {
        return;
    }

    let mut stream = response.bytes_stream();
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(fragment)) => {
                tracing::trace!("transport fragment: {} bytes", fragment.len());
                if tx
                    .send(TransportEvent::Bytes(fragment.to_vec()))
                    .await
                    .is_err()
                {
                    return; // receiver gone, session torn down
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(TransportEvent::Failed(classify(&endpoint, timeout_secs, e)))
                    .await;
                return;
            }
            None => {
                let _ = tx.send(TransportEvent::Closed).await;
                return;
            }
        }
    }
}

fn classify(endpoint: &str, timeout_secs: u64, e: reqwest::Error) -> VoxtalkError {
    if e.is_timeout() {
        VoxtalkError::Timeout {
            seconds: timeout_secs,
        }
    } else if e.is_connect() {
        VoxtalkError::Connect {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        }
    } else {
        VoxtalkError::Stream {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                // Drain the request head before answering.
                let mut buf = [0u8; 4096];
                use tokio::io::AsyncReadExt;
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/session")
    }

    #[tokio::test]
    async fn test_successful_stream_delivers_bytes_then_closed() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-length: 11\r\n\r\ndata: hello",
        )
        .await;
        let transport =
            StreamTransport::new(&endpoint, Duration::from_secs(5)).expect("transport");
        let token = CancellationToken::new();
        let (mut rx, _handle) = transport.open(String::from("{}"), &token, 8);

        assert!(matches!(rx.recv().await, Some(TransportEvent::Connected)));
        let mut collected = Vec::new();
        loop {
            match rx.recv().await {
                Some(TransportEvent::Bytes(b)) => collected.extend(b),
                Some(TransportEvent::Closed) => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(collected, b"data: hello");
    }

    #[tokio::test]
    async fn test_http_error_status_is_connect_failure() {
        let endpoint =
            serve_once("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n").await;
        let transport =
            StreamTransport::new(&endpoint, Duration::from_secs(5)).expect("transport");
        let token = CancellationToken::new();
        let (mut rx, _handle) = transport.open(String::from("{}"), &token, 8);

        match rx.recv().await {
            Some(TransportEvent::Failed(VoxtalkError::Connect { message, .. })) => {
                assert!(message.contains("503"));
            }
            other => panic!("expected connect failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_fatal() {
        // Port 9 on localhost is overwhelmingly likely to be closed.
        let transport = StreamTransport::new("http://127.0.0.1:9/none", Duration::from_secs(2))
            .expect("transport");
        let token = CancellationToken::new();
        let (mut rx, _handle) = transport.open(String::from("{}"), &token, 8);

        match rx.recv().await {
            Some(TransportEvent::Failed(e)) => assert!(e.is_fatal()),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_silences_the_channel() {
        let endpoint = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello").await;
        let transport =
            StreamTransport::new(&endpoint, Duration::from_secs(5)).expect("transport");
        let token = CancellationToken::new();
        let (mut rx, handle) = transport.open(String::from("{}"), &token, 8);

        handle.cancel();
        handle.cancel(); // idempotent

        // The task must stop sending and drop its sender, closing the
        // channel. Draining with a timeout proves no hang either way;
        // events already queued before the cancel are allowed through.
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "channel must close after cancellation");
    }
}
